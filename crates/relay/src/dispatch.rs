//! Sends a build event's commit status to its provider.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{BuildEvent, CredentialCache, Provider, RelayError, StatusPoster};

/// Response codes treated as an accepted status update.
const ACCEPTED_STATUS_CODES: [u16; 2] = [200, 201];

/// Outcome of a successful status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub provider: Provider,
    pub url: String,
    /// Provider-specific state that was posted.
    pub state: &'static str,
    pub http_status: u16,
}

/// Resolves the provider for an event and posts its commit status.
pub struct StatusDispatcher {
    poster: Arc<dyn StatusPoster>,
}

impl StatusDispatcher {
    pub fn new(poster: Arc<dyn StatusPoster>) -> Self {
        Self { poster }
    }

    /// Posts the status for `event`, decrypting provider credentials through
    /// `credentials` on first use.
    #[instrument(skip_all, fields(mirror = %event.mirror(), commit = %event.commit(), state = %event.state()))]
    pub async fn send_status(
        &self,
        event: &BuildEvent,
        credentials: &CredentialCache,
    ) -> Result<StatusReport, RelayError> {
        let provider = Provider::from_tag(event.mirror().provider())?;
        let auth = credentials.get(provider).await?;
        let request = provider.status_request(event)?;

        let http_status = self
            .poster
            .post(&request, &auth)
            .await
            .map_err(|e| RelayError::Transport {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        if !ACCEPTED_STATUS_CODES.contains(&http_status) {
            warn!(provider = %provider, url = %request.url, http_status, "status update rejected");
            return Err(RelayError::HttpStatus {
                status: http_status,
                url: request.url,
            });
        }

        let report = StatusReport {
            provider,
            state: request.payload.state(),
            url: request.url,
            http_status,
        };
        info!(provider = %report.provider, state = report.state, http_status, "status posted");
        Ok(report)
    }
}

//! Source-control provider adapter.
//!
//! Implements [`relay::StatusPoster`] with `reqwest`: the request built by
//! [`relay::Provider`] is sent as JSON with HTTP Basic auth. GitHub accepts a
//! personal access token as the password; Bitbucket an app password.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Only transport lives here. Which URL, which body, and
//! which response codes count as success are decided by the [`relay`] crate.

use async_trait::async_trait;
use relay::{Provider, ProviderCredentials, StatusPoster, StatusRequest, TransportError};
use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::{debug, warn};

/// `User-Agent` sent with every request; GitHub rejects requests without one.
pub const RELAY_USER_AGENT: &str = concat!("cloud-build-status/", env!("CARGO_PKG_VERSION"));

/// Posts commit statuses over HTTPS.
#[derive(Debug, Clone, Default)]
pub struct HttpStatusPoster {
    http: reqwest::Client,
}

impl HttpStatusPoster {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn accept_header(provider: Provider) -> &'static str {
    match provider {
        Provider::Github => "application/vnd.github+json",
        Provider::Bitbucket => "application/json",
    }
}

#[async_trait]
impl StatusPoster for HttpStatusPoster {
    async fn post(
        &self,
        request: &StatusRequest,
        credentials: &ProviderCredentials,
    ) -> Result<u16, TransportError> {
        debug!(provider = %request.provider, url = %request.url, "posting commit status");
        let response = self
            .http
            .post(&request.url)
            .basic_auth(credentials.username(), Some(credentials.password()))
            .header(USER_AGENT, RELAY_USER_AGENT)
            .header(ACCEPT, accept_header(request.provider))
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %request.provider, url = %request.url, %status, body = body.trim(), "provider rejected status");
        }
        Ok(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderMap, StatusCode};
    use axum::Router;
    use relay::{StatusPayload, STATUS_CONTEXT};
    use serde_json::{json, Value};

    use super::*;

    #[derive(Debug, Clone)]
    struct Received {
        path: String,
        authorization: Option<String>,
        user_agent: Option<String>,
        body: Value,
    }

    /// Serves a provider API that answers every POST with `status`.
    async fn fake_provider(status: StatusCode, received: Arc<Mutex<Vec<Received>>>) -> String {
        let router = Router::new().fallback(move |uri: axum::http::Uri, headers: HeaderMap, body: String| {
            let received = received.clone();
            async move {
                let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
                received.lock().unwrap().push(Received {
                    path: uri.path().to_string(),
                    authorization: header("authorization"),
                    user_agent: header("user-agent"),
                    body: serde_json::from_str(&body).unwrap_or_default(),
                });
                (status, r#"{"message":"from fake"}"#)
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn bitbucket_request(base: &str) -> StatusRequest {
        StatusRequest {
            provider: Provider::Bitbucket,
            url: format!("{base}/2.0/repositories/garman/webapp/commit/65ca6a99/statuses/build"),
            payload: StatusPayload::Bitbucket {
                description: "SUCCESS".to_string(),
                state: "SUCCESSFUL",
                name: STATUS_CONTEXT,
                url: "https://console.cloud.google.com/gcr/builds/aeccd2ef".to_string(),
                key: "2bceb582-3141-44bf-b444-5640cbcaecc5".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn posts_json_with_basic_auth() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let base = fake_provider(StatusCode::CREATED, received.clone()).await;

        let status = HttpStatusPoster::default()
            .post(&bitbucket_request(&base), &ProviderCredentials::new("lg", "12345678"))
            .await
            .unwrap();

        assert_eq!(status, 201);
        let received = received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].path, "/2.0/repositories/garman/webapp/commit/65ca6a99/statuses/build");
        assert_eq!(received[0].authorization.as_deref(), Some("Basic bGc6MTIzNDU2Nzg="));
        assert_eq!(received[0].user_agent.as_deref(), Some(RELAY_USER_AGENT));
        assert_eq!(
            received[0].body,
            json!({
                "description": "SUCCESS",
                "state": "SUCCESSFUL",
                "name": "Google Cloud Build",
                "url": "https://console.cloud.google.com/gcr/builds/aeccd2ef",
                "key": "2bceb582-3141-44bf-b444-5640cbcaecc5"
            })
        );
    }

    #[tokio::test]
    async fn error_statuses_are_returned_not_raised() {
        let base = fake_provider(StatusCode::FORBIDDEN, Arc::new(Mutex::new(Vec::new()))).await;

        let status = HttpStatusPoster::default()
            .post(&bitbucket_request(&base), &ProviderCredentials::new("lg", "wrong"))
            .await
            .unwrap();

        assert_eq!(status, 403);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = HttpStatusPoster::default()
            .post(&bitbucket_request(&base), &ProviderCredentials::new("lg", "12345678"))
            .await;

        assert!(result.is_err());
    }
}

//! OAuth access tokens for Google APIs.
//!
//! On Cloud Run and Cloud Functions the metadata server hands out tokens for
//! the service's runtime account. For local runs a token can be supplied via
//! `GOOGLE_OAUTH_ACCESS_TOKEN` (e.g. `gcloud auth print-access-token`).

use serde::Deserialize;
use thiserror::Error;

/// Metadata-server endpoint for the default service account's token.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Environment variable holding a pre-issued access token.
pub const ACCESS_TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Debug, Error)]
#[error("Could not obtain an access token: {message}")]
pub struct TokenError {
    pub message: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Where access tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// A fixed token.
    Static(String),
    /// The instance metadata server at `url`.
    Metadata { url: String },
}

impl TokenSource {
    /// Uses `GOOGLE_OAUTH_ACCESS_TOKEN` if set, otherwise the metadata server.
    pub fn from_env() -> Self {
        match std::env::var(ACCESS_TOKEN_VAR) {
            Ok(token) if !token.trim().is_empty() => TokenSource::Static(token.trim().to_string()),
            _ => TokenSource::Metadata {
                url: METADATA_TOKEN_URL.to_string(),
            },
        }
    }

    /// Returns a bearer token, asking the metadata server each time.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, TokenError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { url } => {
                let response = http
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| TokenError {
                        message: e.to_string(),
                    })?;
                let token: MetadataToken = response.json().await.map_err(|e| TokenError {
                    message: format!("unexpected metadata response: {e}"),
                })?;
                Ok(token.access_token)
            }
        }
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("TokenSource::Static(<redacted>)"),
            TokenSource::Metadata { url } => f.debug_struct("TokenSource::Metadata").field("url", url).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::Router;

    use super::*;
    use crate::test_server::serve;

    #[tokio::test]
    async fn metadata_token_requires_flavor_header() {
        let router = Router::new().fallback(|headers: HeaderMap| async move {
            if headers.get("Metadata-Flavor").map(|v| v.as_bytes()) == Some(b"Google".as_slice()) {
                r#"{"access_token":"ya29.token","expires_in":3599,"token_type":"Bearer"}"#.into_response()
            } else {
                StatusCode::FORBIDDEN.into_response()
            }
        });
        let base = serve(router).await;
        let source = TokenSource::Metadata {
            url: format!("{base}/computeMetadata/v1/instance/service-accounts/default/token"),
        };

        let token = source.access_token(&reqwest::Client::new()).await.unwrap();
        assert_eq!(token, "ya29.token");
    }

    #[tokio::test]
    async fn metadata_failure_is_an_error() {
        let base = serve(Router::new().fallback(|| async { StatusCode::NOT_FOUND })).await;
        let source = TokenSource::Metadata { url: base };

        let err = source.access_token(&reqwest::Client::new()).await.unwrap_err();
        assert!(err.to_string().contains("404"), "{err}");
    }

    #[test]
    fn static_token_is_not_printed() {
        let rendered = format!("{:?}", TokenSource::Static("secret".to_string()));
        assert!(!rendered.contains("secret"));
    }
}

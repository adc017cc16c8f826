//! Cloud Storage [`CiphertextStore`] over the JSON API.

use async_trait::async_trait;
use relay::{CiphertextStore, StorageError};
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::TokenSource;

/// Production Cloud Storage endpoint.
pub const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Reads credential ciphertext from a Cloud Storage bucket.
///
/// The bucket is looked up before the object so a misconfigured bucket name
/// is reported as such rather than as a missing object.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: reqwest::Client,
    tokens: TokenSource,
    base_url: String,
}

impl GcsObjectStore {
    pub fn new(http: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            http,
            tokens,
            base_url: STORAGE_BASE_URL.to_string(),
        }
    }

    /// Points the store at another endpoint (emulator or test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| unavailable(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| unavailable(format!("base URL {} cannot have a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, token: &str) -> Result<reqwest::Response, StorageError> {
        self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))
    }
}

#[async_trait]
impl CiphertextStore for GcsObjectStore {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StorageError> {
        let token = self
            .tokens
            .access_token(&self.http)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let response = self.get(self.endpoint(&["storage", "v1", "b", bucket])?, &token).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(StorageError::BucketNotFound {
                    bucket: bucket.to_string(),
                })
            }
            status if !status.is_success() => {
                return Err(unavailable(format!("HTTP {status} reading bucket {bucket}")))
            }
            _ => {}
        }

        let mut url = self.endpoint(&["storage", "v1", "b", bucket, "o", object])?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self.get(url, &token).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            }),
            status if !status.is_success() => Err(unavailable(format!(
                "HTTP {status} reading object {object} in bucket {bucket}"
            ))),
            _ => {
                let bytes = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;
                debug!(bucket, object, len = bytes.len(), "downloaded ciphertext");
                Ok(bytes.to_vec())
            }
        }
    }
}

fn unavailable(message: impl Into<String>) -> StorageError {
    StorageError::Unavailable {
        message: message.into(),
    }
}

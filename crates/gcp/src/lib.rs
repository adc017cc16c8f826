//! Google Cloud infrastructure adapter.
//!
//! Implements the credential ports of the [`relay`] crate:
//!
//! - [`GcsObjectStore`]: [`relay::CiphertextStore`] over the Cloud Storage
//!   JSON API.
//! - [`KmsDecryptor`]: [`relay::Decryptor`] over the Cloud KMS REST API.
//!
//! Both authenticate with a bearer token from a [`TokenSource`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, URL construction, and Google API error
//! mapping live here. The [`relay`] crate sees only the port traits and the
//! [`relay::StorageError`] / [`relay::DecryptError`] values returned through them.
//!
//! No retries are attempted; a failed call fails the invocation.

pub mod kms;
pub mod storage;
pub mod token;

pub use kms::{KmsDecryptor, KMS_BASE_URL};
pub use storage::{GcsObjectStore, STORAGE_BASE_URL};
pub use token::{TokenError, TokenSource, ACCESS_TOKEN_VAR, METADATA_TOKEN_URL};

#[cfg(test)]
mod test_server {
    use axum::Router;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }
}

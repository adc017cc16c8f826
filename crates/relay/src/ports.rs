//! Port traits implemented by infrastructure crates.
//!
//! The relay domain never talks to Cloud Storage, Cloud KMS, or a provider API
//! directly. The `gcp` crate implements [`CiphertextStore`] and [`Decryptor`];
//! the `scm` crate implements [`StatusPoster`]. In-memory versions live in
//! [`crate::fakes`] behind the `fakes` feature.

use async_trait::async_trait;

use crate::{DecryptError, ProviderCredentials, StatusRequest, StorageError, TransportError};

/// Object store holding one encrypted credential blob per provider.
#[async_trait]
pub trait CiphertextStore: Send + Sync {
    /// Downloads `object` from `bucket`.
    ///
    /// Returns [`StorageError::BucketNotFound`] or [`StorageError::ObjectNotFound`]
    /// when either is absent.
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StorageError>;
}

/// Symmetric decryption service.
#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Decrypts `ciphertext` with the key named by `crypto_key_id`.
    async fn decrypt(&self, crypto_key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError>;
}

/// Outbound HTTP transport for commit-status requests.
#[async_trait]
pub trait StatusPoster: Send + Sync {
    /// Sends `request` as JSON with HTTP Basic auth and returns the response
    /// status code. Interpreting the code is the caller's job.
    async fn post(
        &self,
        request: &StatusRequest,
        credentials: &ProviderCredentials,
    ) -> Result<u16, TransportError>;
}

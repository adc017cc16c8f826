//! Error types for the relay domain.
//!
//! [`RelayError`] is what an invocation fails with. The port traits in
//! [`crate::ports`] report their own narrower errors ([`StorageError`],
//! [`DecryptError`], [`TransportError`]) which the domain wraps.
//!
//! An event that does not describe a source-repository build is **not** an
//! error; see [`crate::Decoded::Irrelevant`].

use thiserror::Error;

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure reading a ciphertext object from the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The configured credentials bucket does not exist.
    #[error("Could not find bucket {bucket}")]
    BucketNotFound {
        /// Bucket name as configured.
        bucket: String,
    },

    /// The bucket exists but holds no object for the provider.
    #[error("Could not find object {object} in bucket {bucket}")]
    ObjectNotFound {
        /// Bucket name as configured.
        bucket: String,
        /// Object name (the lowercase provider name).
        object: String,
    },

    /// The store could not be reached or answered unexpectedly.
    #[error("Credential store unavailable: {message}")]
    Unavailable {
        /// Description of the underlying failure.
        message: String,
    },
}

/// Failure decrypting a ciphertext object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Decryption failed: {message}")]
pub struct DecryptError {
    /// Description of the underlying failure.
    pub message: String,
}

impl DecryptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure sending a request to a source-control provider (no response received).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation errors
// ---------------------------------------------------------------------------

/// Errors that fail a relay invocation.
///
/// None of these are retried by the relay. The hosting platform decides
/// whether to redeliver the message.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The Pub/Sub message or the build payload inside it could not be decoded.
    #[error("Invalid build event: {message}")]
    InvalidEnvelope {
        /// Description of what was malformed or missing.
        message: String,
    },

    /// The mirror name carries a provider tag with no matching provider.
    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider {
        /// The provider tag as it appeared in the mirror name.
        provider: String,
    },

    /// A required environment setting is missing or empty.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The ciphertext object could not be fetched.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The ciphertext object could not be decrypted.
    #[error(transparent)]
    Decryption(#[from] DecryptError),

    /// The decrypted credentials are not a `{username, password}` JSON object.
    #[error("Malformed credentials: {message}")]
    CredentialFormat {
        /// Description of the parse failure.
        message: String,
    },

    /// The status request could not be sent.
    #[error("POST {url} failed: {message}")]
    Transport {
        /// Target URL of the request.
        url: String,
        /// Description of the transport failure.
        message: String,
    },

    /// The provider answered with a status code other than 200 or 201.
    #[error("HTTP {status} response from POST {url}")]
    HttpStatus {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Target URL of the request.
        url: String,
    },
}

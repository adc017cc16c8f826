//! In-memory port implementations (testing only).
//!
//! Every fake records the calls it receives so tests can assert on call
//! counts, e.g. that a second invocation never touches the store.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::credentials::{CREDENTIALS_BUCKET_VAR, KMS_CRYPTO_KEY_ID_VAR};
use crate::{
    CiphertextStore, DecryptError, Decryptor, ProviderCredentials, StatusPoster, StatusRequest,
    StorageError, TransportError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Environment lookup answering only the two credential settings.
pub fn settings(
    bucket: &str,
    crypto_key_id: &str,
) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    let bucket = bucket.to_string();
    let crypto_key_id = crypto_key_id.to_string();
    move |name: &str| match name {
        CREDENTIALS_BUCKET_VAR => Some(bucket.clone()),
        KMS_CRYPTO_KEY_ID_VAR => Some(crypto_key_id.clone()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// MemoryCiphertextStore
// ---------------------------------------------------------------------------

/// Object store backed by a `HashMap<(bucket, object), bytes>`.
#[derive(Debug, Default)]
pub struct MemoryCiphertextStore {
    buckets: HashSet<String>,
    objects: HashMap<(String, String), Vec<u8>>,
    fetches: Mutex<Vec<(String, String)>>,
}

impl MemoryCiphertextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object, creating its bucket if needed.
    pub fn with_object(mut self, bucket: &str, object: &str, ciphertext: &[u8]) -> Self {
        self.buckets.insert(bucket.to_string());
        self.objects
            .insert((bucket.to_string(), object.to_string()), ciphertext.to_vec());
        self
    }

    /// Every `(bucket, object)` fetched so far, in order.
    pub fn fetches(&self) -> Vec<(String, String)> {
        lock(&self.fetches).clone()
    }
}

#[async_trait]
impl CiphertextStore for MemoryCiphertextStore {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StorageError> {
        lock(&self.fetches).push((bucket.to_string(), object.to_string()));
        if !self.buckets.contains(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        self.objects
            .get(&(bucket.to_string(), object.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryDecryptor
// ---------------------------------------------------------------------------

/// Decryptor backed by a `HashMap<ciphertext, plaintext>`.
///
/// Unknown ciphertext fails the way a real key service rejects garbage input.
#[derive(Debug, Default)]
pub struct MemoryDecryptor {
    plaintexts: HashMap<Vec<u8>, Vec<u8>>,
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plaintext(mut self, ciphertext: &[u8], plaintext: &[u8]) -> Self {
        self.plaintexts.insert(ciphertext.to_vec(), plaintext.to_vec());
        self
    }

    /// Every `(crypto_key_id, ciphertext)` decrypted so far, in order.
    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Decryptor for MemoryDecryptor {
    async fn decrypt(&self, crypto_key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        lock(&self.calls).push((crypto_key_id.to_string(), ciphertext.to_vec()));
        self.plaintexts
            .get(ciphertext)
            .cloned()
            .ok_or_else(|| DecryptError::new("ciphertext is invalid"))
    }
}

// ---------------------------------------------------------------------------
// RecordingStatusPoster
// ---------------------------------------------------------------------------

/// A request captured by [`RecordingStatusPoster`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostedStatus {
    pub request: StatusRequest,
    pub credentials: ProviderCredentials,
}

/// Status poster that records requests and answers with a fixed status code.
#[derive(Debug)]
pub struct RecordingStatusPoster {
    response: Result<u16, TransportError>,
    posted: Mutex<Vec<PostedStatus>>,
}

impl RecordingStatusPoster {
    /// Answers every request with `status`.
    pub fn responding(status: u16) -> Self {
        Self {
            response: Ok(status),
            posted: Mutex::new(Vec::new()),
        }
    }

    /// Fails every request without a response.
    pub fn unreachable(message: &str) -> Self {
        Self {
            response: Err(TransportError::new(message)),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn posted(&self) -> Vec<PostedStatus> {
        lock(&self.posted).clone()
    }
}

#[async_trait]
impl StatusPoster for RecordingStatusPoster {
    async fn post(
        &self,
        request: &StatusRequest,
        credentials: &ProviderCredentials,
    ) -> Result<u16, TransportError> {
        lock(&self.posted).push(PostedStatus {
            request: request.clone(),
            credentials: credentials.clone(),
        });
        self.response.clone()
    }
}

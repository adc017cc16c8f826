//! Lazily decrypted, per-provider credential cache.
//!
//! Credentials are stored encrypted, one object per provider, in a bucket
//! named by `CREDENTIALS_BUCKET`. On the first request for a provider the
//! object is fetched, decrypted with the key named by `KMS_CRYPTO_KEY_ID`, and
//! kept for the lifetime of the cache. Entries are never refreshed; rotating
//! credentials requires a restart.
//!
//! The map lock is held only for lookups and inserts, never across an await.
//! Two concurrent misses for one provider may both fetch and decrypt; the
//! later insert wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{CiphertextStore, Decryptor, Provider, RelayError};

/// Environment variable naming the bucket that holds the ciphertext objects.
pub const CREDENTIALS_BUCKET_VAR: &str = "CREDENTIALS_BUCKET";

/// Environment variable naming the KMS crypto key used for decryption.
pub const KMS_CRYPTO_KEY_ID_VAR: &str = "KMS_CRYPTO_KEY_ID";

/// Username and password (or app password / token) for one provider.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderCredentials {
    username: String,
    password: String,
}

impl ProviderCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Process-lifetime cache of decrypted provider credentials.
pub struct CredentialCache {
    store: Arc<dyn CiphertextStore>,
    decryptor: Arc<dyn Decryptor>,
    env: EnvLookup,
    entries: Mutex<HashMap<Provider, ProviderCredentials>>,
}

impl CredentialCache {
    /// Creates an empty cache that reads its settings from the process environment.
    pub fn new(store: Arc<dyn CiphertextStore>, decryptor: Arc<dyn Decryptor>) -> Self {
        Self {
            store,
            decryptor,
            env: Arc::new(|name| std::env::var(name).ok()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the environment lookup used on a cache miss.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Returns the credentials for `provider`, decrypting them on first use.
    pub async fn get(&self, provider: Provider) -> Result<ProviderCredentials, RelayError> {
        if let Some(credentials) = self.entries().get(&provider).cloned() {
            debug!(provider = %provider, "credential cache hit");
            return Ok(credentials);
        }

        let credentials = self.load(provider).await?;
        self.entries().insert(provider, credentials.clone());
        Ok(credentials)
    }

    /// Returns `true` if credentials for `provider` are already decrypted.
    pub fn is_cached(&self, provider: Provider) -> bool {
        self.entries().contains_key(&provider)
    }

    async fn load(&self, provider: Provider) -> Result<ProviderCredentials, RelayError> {
        let bucket = self.setting(CREDENTIALS_BUCKET_VAR)?;
        let crypto_key_id = self.setting(KMS_CRYPTO_KEY_ID_VAR)?;
        let object = provider.object_name();

        info!(provider = %provider, %bucket, %object, "decrypting provider credentials");
        let ciphertext = self.store.fetch(&bucket, object).await?;
        let plaintext = self.decryptor.decrypt(&crypto_key_id, &ciphertext).await?;

        let text = std::str::from_utf8(&plaintext).map_err(|e| RelayError::CredentialFormat {
            message: format!("{provider} credentials are not UTF-8: {e}"),
        })?;
        serde_json::from_str(text.trim()).map_err(|e| RelayError::CredentialFormat {
            message: format!("{provider} credentials are not a username/password object: {e}"),
        })
    }

    fn setting(&self, name: &str) -> Result<String, RelayError> {
        match (self.env)(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(RelayError::Configuration {
                message: format!("environment variable {name} is not set"),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Provider, ProviderCredentials>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

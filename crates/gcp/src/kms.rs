//! Cloud KMS [`Decryptor`] over the REST API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use relay::{DecryptError, Decryptor};
use serde::{Deserialize, Serialize};

use crate::TokenSource;

/// Production Cloud KMS endpoint.
pub const KMS_BASE_URL: &str = "https://cloudkms.googleapis.com";

#[derive(Serialize)]
struct DecryptRequest {
    ciphertext: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    #[serde(default)]
    plaintext: String,
}

/// Decrypts with a symmetric Cloud KMS key.
///
/// `crypto_key_id` is the full resource name,
/// `projects/{p}/locations/{l}/keyRings/{r}/cryptoKeys/{k}`.
#[derive(Debug, Clone)]
pub struct KmsDecryptor {
    http: reqwest::Client,
    tokens: TokenSource,
    base_url: String,
}

impl KmsDecryptor {
    pub fn new(http: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            http,
            tokens,
            base_url: KMS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn decrypt_url(&self, crypto_key_id: &str) -> String {
        format!(
            "{}/v1/{}:decrypt",
            self.base_url.trim_end_matches('/'),
            crypto_key_id.trim_matches('/')
        )
    }
}

#[async_trait]
impl Decryptor for KmsDecryptor {
    async fn decrypt(&self, crypto_key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let token = self
            .tokens
            .access_token(&self.http)
            .await
            .map_err(|e| DecryptError::new(e.to_string()))?;

        let response = self
            .http
            .post(self.decrypt_url(crypto_key_id))
            .bearer_auth(token)
            .json(&DecryptRequest {
                ciphertext: STANDARD.encode(ciphertext),
            })
            .send()
            .await
            .map_err(|e| DecryptError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DecryptError::new(format!("HTTP {status} from Cloud KMS: {}", body.trim())));
        }

        let decrypted: DecryptResponse = response
            .json()
            .await
            .map_err(|e| DecryptError::new(format!("unexpected Cloud KMS response: {e}")))?;
        STANDARD
            .decode(decrypted.plaintext)
            .map_err(|e| DecryptError::new(format!("plaintext is not base64: {e}")))
    }
}

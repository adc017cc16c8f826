//! Core domain for the Cloud Build status relay.
//!
//! Cloud Build publishes a message for every build state change. For builds of
//! a mirrored repository, this crate works out which source-control provider
//! hosts the original repository and posts the build state there as a commit
//! status.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! Object storage, decryption, and outbound HTTP are reached through the
//! traits in [`ports`]; the `gcp` and `scm` crates supply implementations.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`CommitSha`, `MirrorId`, `InvocationId`, etc.) |
//! | [`event`] | Pub/Sub envelope, `PipelineState`, `BuildEvent` decoding |
//! | [`provider`] | `Provider` enum: status tables, endpoints, request bodies |
//! | [`credentials`] | `CredentialCache` and `ProviderCredentials` |
//! | [`dispatch`] | `StatusDispatcher`: resolve provider, authenticate, post |
//! | [`handler`] | `Relay`: the per-message entry point |
//! | [`ports`] | Infrastructure traits |
//! | [`errors`] | `RelayError` and port error types |

pub mod credentials;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod handler;
pub mod identifiers;
pub mod ports;
pub mod provider;

#[cfg(any(test, feature = "fakes"))]
pub mod fakes;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use credentials::{CredentialCache, ProviderCredentials};
pub use dispatch::{StatusDispatcher, StatusReport};
pub use errors::{DecryptError, RelayError, StorageError, TransportError};
pub use event::{BuildEvent, Decoded, PipelineState, PubsubMessage, PushRequest};
pub use handler::{Relay, SUCCESS_MARKER};
pub use identifiers::{BuildTriggerId, CommitSha, InvocationId, MirrorId};
pub use ports::{CiphertextStore, Decryptor, StatusPoster};
pub use provider::{Provider, StatusPayload, StatusRequest, STATUS_CONTEXT};

#[cfg(test)]
mod tests {
    //! End-to-end behaviour of [`Relay::handle`] against in-memory ports.

    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::fakes::{settings, MemoryCiphertextStore, MemoryDecryptor, RecordingStatusPoster};

    const BUCKET: &str = "my-secrets-bucket";
    const KEY: &str = "projects/my-project/locations/global/keyRings/secrets/cryptoKeys/bitbucket";

    struct Harness {
        relay: Relay,
        store: Arc<MemoryCiphertextStore>,
        decryptor: Arc<MemoryDecryptor>,
        poster: Arc<RecordingStatusPoster>,
    }

    fn harness(status: u16) -> Harness {
        let store = Arc::new(MemoryCiphertextStore::new().with_object(BUCKET, "bitbucket", b"FALKJFLKN"));
        let decryptor = Arc::new(
            MemoryDecryptor::new().with_plaintext(b"FALKJFLKN", br#"{"username":"lg", "password":"12345678"}"#),
        );
        let poster = Arc::new(RecordingStatusPoster::responding(status));
        let credentials =
            CredentialCache::new(store.clone(), decryptor.clone()).with_env(settings(BUCKET, KEY));
        let relay = Relay::new(credentials, StatusDispatcher::new(poster.clone()));
        Harness {
            relay,
            store,
            decryptor,
            poster,
        }
    }

    fn bitbucket_message() -> PubsubMessage {
        let payload = json!({
            "id": "aeccd2ef-f51a-4a44-8e2e-0de2609ce367",
            "projectId": "my-project",
            "status": "SUCCESS",
            "source": { "repoSource": { "repoName": "bitbucket_garman_webapp", "branchName": "master" } },
            "sourceProvenance": {
                "resolvedRepoSource": {
                    "projectId": "my-project",
                    "repoName": "bitbucket_garman_webapp",
                    "commitSha": "65ca6a99a2573f0f1ff5dc93f78a77966248ea2d"
                }
            },
            "logUrl": "https://console.cloud.google.com/gcr/builds/aeccd2ef-f51a-4a44-8e2e-0de2609ce367?project=292927648743",
            "buildTriggerId": "2bceb582-3141-44bf-b444-5640cbcaecc5"
        });
        PubsubMessage::from_payload(payload.to_string().as_bytes())
    }

    #[tokio::test]
    async fn bitbucket_success_is_posted() {
        let h = harness(200);

        assert_eq!(h.relay.handle(&bitbucket_message()).await.unwrap(), "OK");

        let posted = h.poster.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(
            posted[0].request.url,
            "https://api.bitbucket.org/2.0/repositories/garman/webapp/commit/65ca6a99a2573f0f1ff5dc93f78a77966248ea2d/statuses/build"
        );
        assert_eq!(
            serde_json::to_value(&posted[0].request.payload).unwrap(),
            json!({
                "description": "SUCCESS",
                "state": "SUCCESSFUL",
                "name": "Google Cloud Build",
                "url": "https://console.cloud.google.com/gcr/builds/aeccd2ef-f51a-4a44-8e2e-0de2609ce367?project=292927648743",
                "key": "2bceb582-3141-44bf-b444-5640cbcaecc5"
            })
        );
        assert_eq!(posted[0].credentials.username(), "lg");
        assert_eq!(posted[0].credentials.password(), "12345678");
    }

    #[tokio::test]
    async fn second_invocation_reuses_decrypted_credentials() {
        let h = harness(201);

        h.relay.handle(&bitbucket_message()).await.unwrap();
        h.relay.handle(&bitbucket_message()).await.unwrap();

        assert_eq!(h.store.fetches(), vec![(BUCKET.to_string(), "bitbucket".to_string())]);
        assert_eq!(h.decryptor.calls(), vec![(KEY.to_string(), b"FALKJFLKN".to_vec())]);
        assert_eq!(h.poster.posted().len(), 2);
    }

    #[tokio::test]
    async fn event_without_repo_source_is_ignored() {
        let h = harness(200);
        let message = PubsubMessage::from_payload(
            json!({
                "status": "SUCCESS",
                "sourceProvenance": { "resolvedStorageSource": { "bucket": "b", "object": "o" } },
                "logUrl": "https://example.com/log"
            })
            .to_string()
            .as_bytes(),
        );

        assert_eq!(h.relay.handle(&message).await.unwrap(), SUCCESS_MARKER);
        assert!(h.poster.posted().is_empty());
        assert!(h.store.fetches().is_empty());
    }

    #[tokio::test]
    async fn rejected_post_fails_the_invocation() {
        let h = harness(403);

        let err = h.relay.handle(&bitbucket_message()).await.unwrap_err();

        assert!(err.to_string().contains("403"), "{err}");
    }

    #[tokio::test]
    async fn not_found_fails_the_invocation() {
        let h = harness(404);

        let err = h.relay.handle(&bitbucket_message()).await.unwrap_err();

        assert!(err.to_string().contains("404"), "{err}");
        assert!(h.relay.credentials().is_cached(Provider::Bitbucket));
    }

    #[tokio::test]
    async fn unsupported_provider_fails_the_invocation() {
        let h = harness(200);
        let message = PubsubMessage::from_payload(
            json!({
                "status": "FAILURE",
                "sourceProvenance": {
                    "resolvedRepoSource": { "commitSha": "abc", "repoName": "gitlab_garman_webapp" }
                },
                "logUrl": "https://example.com/log"
            })
            .to_string()
            .as_bytes(),
        );

        let err = h.relay.handle(&message).await.unwrap_err();

        assert!(matches!(err, RelayError::UnsupportedProvider { ref provider } if provider == "gitlab"));
        assert!(h.store.fetches().is_empty());
    }
}

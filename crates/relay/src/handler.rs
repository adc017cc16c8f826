//! Entry point: one Pub/Sub message in, at most one commit status out.

use tracing::{info, Instrument};

use crate::{BuildEvent, CredentialCache, Decoded, InvocationId, PubsubMessage, RelayError, StatusDispatcher};

/// Value returned by [`Relay::handle`] when the message was dealt with,
/// including messages that were deliberately ignored.
pub const SUCCESS_MARKER: &str = "OK";

/// Decodes build events and relays them as commit statuses.
///
/// Owns the credential cache, so one `Relay` should live as long as the
/// process (or worker) that handles messages.
pub struct Relay {
    credentials: CredentialCache,
    dispatcher: StatusDispatcher,
}

impl Relay {
    pub fn new(credentials: CredentialCache, dispatcher: StatusDispatcher) -> Self {
        Self {
            credentials,
            dispatcher,
        }
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Handles one message. Returns [`SUCCESS_MARKER`] on success.
    pub async fn handle(&self, message: &PubsubMessage) -> Result<&'static str, RelayError> {
        let invocation = InvocationId::new_random();
        let span = tracing::info_span!(
            "relay.handle",
            invocation_id = %invocation,
            message_id = message.message_id.as_deref().unwrap_or_default(),
            build_id = message.attributes.get("buildId").map(String::as_str).unwrap_or_default(),
        );

        async move {
            if let Some(published) = message.publish_time {
                info!(%published, "received build event");
            }

            match BuildEvent::decode(message)? {
                Decoded::Irrelevant { reason } => {
                    info!(reason, "ignoring event");
                }
                Decoded::Build(event) => {
                    self.dispatcher.send_status(&event, &self.credentials).await?;
                }
            }
            Ok::<_, RelayError>(SUCCESS_MARKER)
        }
        .instrument(span)
        .await
    }
}

//! Inbound Pub/Sub messages and the build events decoded from them.
//!
//! Cloud Build publishes one message per build state change to the
//! `cloud-builds` topic. The message `data` is the base64-encoded JSON build
//! resource. Only builds of a mirrored source repository carry
//! `sourceProvenance.resolvedRepoSource`; every other build decodes to
//! [`Decoded::Irrelevant`].

use std::collections::HashMap;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BuildTriggerId, CommitSha, MirrorId, RelayError};

// ---------------------------------------------------------------------------
// Pipeline states
// ---------------------------------------------------------------------------

/// Build lifecycle state reported by Cloud Build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    StatusUnknown,
    Queued,
    Working,
    Success,
    Failure,
    Cancelled,
    InternalError,
    Timeout,
}

impl PipelineState {
    /// Every state, in lifecycle order.
    pub const ALL: [PipelineState; 8] = [
        PipelineState::StatusUnknown,
        PipelineState::Queued,
        PipelineState::Working,
        PipelineState::Success,
        PipelineState::Failure,
        PipelineState::Cancelled,
        PipelineState::InternalError,
        PipelineState::Timeout,
    ];

    /// The state name exactly as Cloud Build spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::StatusUnknown => "STATUS_UNKNOWN",
            PipelineState::Queued => "QUEUED",
            PipelineState::Working => "WORKING",
            PipelineState::Success => "SUCCESS",
            PipelineState::Failure => "FAILURE",
            PipelineState::Cancelled => "CANCELLED",
            PipelineState::InternalError => "INTERNAL_ERROR",
            PipelineState::Timeout => "TIMEOUT",
        }
    }
}

impl FromStr for PipelineState {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| RelayError::InvalidEnvelope {
                message: format!("unknown build status '{s}'"),
            })
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transport envelope
// ---------------------------------------------------------------------------

/// A Pub/Sub message as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    /// Base64-encoded message payload.
    #[serde(default)]
    pub data: String,

    /// Message attributes. Cloud Build sets `buildId` and `status`.
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<DateTime<Utc>>,
}

impl PubsubMessage {
    /// Wraps a raw payload the way Pub/Sub does: base64 in `data`, no metadata.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self {
            data: STANDARD.encode(payload),
            attributes: HashMap::new(),
            message_id: None,
            publish_time: None,
        }
    }
}

/// Body of a Pub/Sub push delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub message: PubsubMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

// ---------------------------------------------------------------------------
// Build payload (wire shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    source_provenance: Option<SourceProvenance>,
    #[serde(default)]
    log_url: Option<String>,
    #[serde(default)]
    build_trigger_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceProvenance {
    #[serde(default)]
    resolved_repo_source: Option<RepoSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoSource {
    #[serde(default)]
    commit_sha: Option<String>,
    #[serde(default)]
    repo_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Decoded event
// ---------------------------------------------------------------------------

/// Result of decoding a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A build of a mirrored source repository.
    Build(BuildEvent),
    /// The build has no resolved repository source (e.g. a build from a
    /// storage archive); nothing to report.
    Irrelevant {
        reason: &'static str,
    },
}

/// A build state change for a mirrored repository. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEvent {
    state: PipelineState,
    commit: CommitSha,
    mirror: MirrorId,
    log_url: String,
    build_trigger_id: Option<BuildTriggerId>,
}

impl BuildEvent {
    /// Decodes the base64 JSON payload of `message`.
    pub fn decode(message: &PubsubMessage) -> Result<Decoded, RelayError> {
        let bytes = STANDARD
            .decode(message.data.trim())
            .map_err(|e| invalid(format!("message data is not base64: {e}")))?;
        Self::from_json(&bytes)
    }

    /// Decodes an already base64-decoded build payload.
    pub fn from_json(bytes: &[u8]) -> Result<Decoded, RelayError> {
        let payload: BuildPayload = serde_json::from_slice(bytes)
            .map_err(|e| invalid(format!("message data is not a build resource: {e}")))?;

        let Some(source) = payload
            .source_provenance
            .and_then(|provenance| provenance.resolved_repo_source)
        else {
            return Ok(Decoded::Irrelevant {
                reason: "build has no resolved repository source",
            });
        };

        let state = payload
            .status
            .ok_or_else(|| invalid("missing status"))?
            .parse::<PipelineState>()?;
        let commit = source
            .commit_sha
            .and_then(CommitSha::new)
            .ok_or_else(|| invalid("missing sourceProvenance.resolvedRepoSource.commitSha"))?;
        let mirror = MirrorId::parse(
            source
                .repo_name
                .ok_or_else(|| invalid("missing sourceProvenance.resolvedRepoSource.repoName"))?,
        )?;
        let log_url = payload.log_url.ok_or_else(|| invalid("missing logUrl"))?;

        Ok(Decoded::Build(BuildEvent {
            state,
            commit,
            mirror,
            log_url,
            build_trigger_id: payload.build_trigger_id.and_then(BuildTriggerId::new),
        }))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn commit(&self) -> &CommitSha {
        &self.commit
    }

    pub fn mirror(&self) -> &MirrorId {
        &self.mirror
    }

    /// Cloud Console URL of the build log.
    pub fn log_url(&self) -> &str {
        &self.log_url
    }

    /// Absent for builds started manually rather than by a trigger.
    pub fn build_trigger_id(&self) -> Option<&BuildTriggerId> {
        self.build_trigger_id.as_ref()
    }
}

fn invalid(message: impl Into<String>) -> RelayError {
    RelayError::InvalidEnvelope {
        message: message.into(),
    }
}

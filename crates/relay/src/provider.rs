//! Source-control providers and their commit-status request formats.
//!
//! Providers form a closed set. Each variant owns its status vocabulary, its
//! status endpoint, and its request body shape; adding a provider means adding
//! a variant and filling in every `match` below.

use serde::Serialize;

use crate::{BuildEvent, PipelineState, RelayError};

/// Label shown next to the status on the provider's commit page.
pub const STATUS_CONTEXT: &str = "Google Cloud Build";

/// A source-control provider that accepts commit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Github,
    Bitbucket,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Github, Provider::Bitbucket];

    /// Resolves the provider tag of a mirror name, ignoring case.
    pub fn from_tag(tag: &str) -> Result<Self, RelayError> {
        Provider::ALL
            .into_iter()
            .find(|provider| provider.name().eq_ignore_ascii_case(tag))
            .ok_or_else(|| RelayError::UnsupportedProvider {
                provider: tag.to_string(),
            })
    }

    /// Display name of the provider.
    pub fn name(self) -> &'static str {
        match self {
            Provider::Github => "Github",
            Provider::Bitbucket => "Bitbucket",
        }
    }

    /// Name of the ciphertext object holding this provider's credentials.
    pub fn object_name(self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Bitbucket => "bitbucket",
        }
    }

    /// Maps a build state onto the provider's status vocabulary.
    pub fn state_for(self, state: PipelineState) -> &'static str {
        use PipelineState::*;

        match self {
            Provider::Github => match state {
                StatusUnknown | Queued | Working => "pending",
                Success => "success",
                Failure | Cancelled => "failure",
                InternalError | Timeout => "error",
            },
            Provider::Bitbucket => match state {
                StatusUnknown | Queued | Working => "INPROGRESS",
                Success => "SUCCESSFUL",
                Failure | Cancelled => "FAILED",
                InternalError | Timeout => "STOPPED",
            },
        }
    }

    /// Commit-status endpoint for the event's repository and commit.
    pub fn status_url(self, event: &BuildEvent) -> String {
        let mirror = event.mirror();
        let (owner, repo, commit) = (mirror.owner(), mirror.repo(), event.commit());
        match self {
            Provider::Github => {
                format!("https://api.github.com/repos/{owner}/{repo}/statuses/{commit}")
            }
            Provider::Bitbucket => format!(
                "https://api.bitbucket.org/2.0/repositories/{owner}/{repo}/commit/{commit}/statuses/build"
            ),
        }
    }

    /// Request body for the event.
    ///
    /// Bitbucket keys statuses by build trigger, so an event without a trigger
    /// id cannot be reported there.
    pub fn payload(self, event: &BuildEvent) -> Result<StatusPayload, RelayError> {
        let description = event.state().as_str().to_string();
        let state = self.state_for(event.state());
        match self {
            Provider::Github => Ok(StatusPayload::Github {
                description,
                state,
                context: STATUS_CONTEXT,
                target_url: event.log_url().to_string(),
            }),
            Provider::Bitbucket => {
                let key = event
                    .build_trigger_id()
                    .ok_or_else(|| RelayError::InvalidEnvelope {
                        message: "Bitbucket statuses require a buildTriggerId".to_string(),
                    })?;
                Ok(StatusPayload::Bitbucket {
                    description,
                    state,
                    name: STATUS_CONTEXT,
                    url: event.log_url().to_string(),
                    key: key.to_string(),
                })
            }
        }
    }

    /// Builds the full request for the event.
    pub fn status_request(self, event: &BuildEvent) -> Result<StatusRequest, RelayError> {
        Ok(StatusRequest {
            provider: self,
            url: self.status_url(event),
            payload: self.payload(event)?,
        })
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// JSON body of a commit-status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusPayload {
    /// `POST /repos/{owner}/{repo}/statuses/{sha}`
    Github {
        description: String,
        state: &'static str,
        context: &'static str,
        target_url: String,
    },
    /// `POST /2.0/repositories/{workspace}/{repo}/commit/{sha}/statuses/build`
    Bitbucket {
        description: String,
        state: &'static str,
        name: &'static str,
        url: String,
        key: String,
    },
}

impl StatusPayload {
    /// The provider-specific state value carried in the body.
    pub fn state(&self) -> &'static str {
        match self {
            StatusPayload::Github { state, .. } | StatusPayload::Bitbucket { state, .. } => *state,
        }
    }
}

/// A commit-status request ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub provider: Provider,
    pub url: String,
    pub payload: StatusPayload,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Decoded, PubsubMessage};

    fn event(repo_name: &str, status: &str, trigger: Option<&str>) -> BuildEvent {
        let mut payload = json!({
            "status": status,
            "sourceProvenance": {
                "resolvedRepoSource": {
                    "commitSha": "65ca6a99a2573f0f1ff5dc93f78a77966248ea2d",
                    "repoName": repo_name
                }
            },
            "logUrl": "https://console.cloud.google.com/gcr/builds/aeccd2ef"
        });
        if let Some(trigger) = trigger {
            payload["buildTriggerId"] = json!(trigger);
        }
        let message = PubsubMessage::from_payload(payload.to_string().as_bytes());
        match BuildEvent::decode(&message).unwrap() {
            Decoded::Build(event) => event,
            other => panic!("expected a build event, got {other:?}"),
        }
    }

    #[test]
    fn github_status_table() {
        let expected = [
            (PipelineState::StatusUnknown, "pending"),
            (PipelineState::Queued, "pending"),
            (PipelineState::Working, "pending"),
            (PipelineState::Success, "success"),
            (PipelineState::Failure, "failure"),
            (PipelineState::Cancelled, "failure"),
            (PipelineState::InternalError, "error"),
            (PipelineState::Timeout, "error"),
        ];
        for (state, mapped) in expected {
            assert_eq!(Provider::Github.state_for(state), mapped, "{state}");
        }
    }

    #[test]
    fn bitbucket_status_table() {
        let expected = [
            (PipelineState::StatusUnknown, "INPROGRESS"),
            (PipelineState::Queued, "INPROGRESS"),
            (PipelineState::Working, "INPROGRESS"),
            (PipelineState::Success, "SUCCESSFUL"),
            (PipelineState::Failure, "FAILED"),
            (PipelineState::Cancelled, "FAILED"),
            (PipelineState::InternalError, "STOPPED"),
            (PipelineState::Timeout, "STOPPED"),
        ];
        for (state, mapped) in expected {
            assert_eq!(Provider::Bitbucket.state_for(state), mapped, "{state}");
        }
    }

    #[test]
    fn provider_tags_match_case_insensitively() {
        assert_eq!(Provider::from_tag("github").unwrap(), Provider::Github);
        assert_eq!(Provider::from_tag("GitHub").unwrap(), Provider::Github);
        assert_eq!(Provider::from_tag("BITBUCKET").unwrap(), Provider::Bitbucket);
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = Provider::from_tag("gitlab").unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedProvider { ref provider } if provider == "gitlab"));
    }

    #[test]
    fn github_request() {
        let event = event("github_leg100_webapp", "CANCELLED", None);
        let request = Provider::Github.status_request(&event).unwrap();

        assert_eq!(
            request.url,
            "https://api.github.com/repos/leg100/webapp/statuses/65ca6a99a2573f0f1ff5dc93f78a77966248ea2d"
        );
        assert_eq!(
            serde_json::to_value(&request.payload).unwrap(),
            json!({
                "description": "CANCELLED",
                "state": "failure",
                "context": "Google Cloud Build",
                "target_url": "https://console.cloud.google.com/gcr/builds/aeccd2ef"
            })
        );
    }

    #[test]
    fn bitbucket_request() {
        let event = event(
            "bitbucket_garman_my_repo",
            "TIMEOUT",
            Some("2bceb582-3141-44bf-b444-5640cbcaecc5"),
        );
        let request = Provider::Bitbucket.status_request(&event).unwrap();

        assert_eq!(
            request.url,
            "https://api.bitbucket.org/2.0/repositories/garman/my_repo/commit/65ca6a99a2573f0f1ff5dc93f78a77966248ea2d/statuses/build"
        );
        assert_eq!(request.payload.state(), "STOPPED");
        assert_eq!(
            serde_json::to_value(&request.payload).unwrap(),
            json!({
                "description": "TIMEOUT",
                "state": "STOPPED",
                "name": "Google Cloud Build",
                "url": "https://console.cloud.google.com/gcr/builds/aeccd2ef",
                "key": "2bceb582-3141-44bf-b444-5640cbcaecc5"
            })
        );
    }

    #[test]
    fn bitbucket_requires_trigger_id() {
        let event = event("bitbucket_garman_webapp", "SUCCESS", None);
        let err = Provider::Bitbucket.payload(&event).unwrap_err();
        assert!(err.to_string().contains("buildTriggerId"), "{err}");
    }
}

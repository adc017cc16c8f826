//! Newtype domain identifiers.
//!
//! Every value with an identity is a distinct newtype so that, for example, a
//! [`CommitSha`] can never be passed where a [`BuildTriggerId`] is expected even
//! though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RelayError;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// A Git commit SHA as resolved by Cloud Build for the built revision.
    CommitSha
}

string_id! {
    /// Identifies the Cloud Build trigger that started a build.
    ///
    /// Bitbucket uses it as the status `key`, so repeated builds from the same
    /// trigger update one status entry rather than adding new ones.
    BuildTriggerId
}

// ---------------------------------------------------------------------------
// Invocation identifier
// ---------------------------------------------------------------------------

/// Identifies a single relay invocation (one Pub/Sub message handled).
///
/// Generated fresh for every message and recorded on the `relay.handle` span
/// so all activity for one event can be correlated in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Mirror identifier
// ---------------------------------------------------------------------------

/// Name of a Cloud Source Repositories mirror: `<provider>_<owner>_<repo>`.
///
/// The owner is the second `_`-delimited segment and the repository is
/// everything after it, so `bitbucket_garman_my_repo` has owner `garman` and
/// repository `my_repo`. Owners containing underscores are therefore split
/// incorrectly; the rule is kept because it decides where statuses are posted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorId {
    raw: String,
    provider: String,
    owner: String,
    repo: String,
}

impl MirrorId {
    /// Parses a mirror name.
    ///
    /// Fails with [`RelayError::InvalidEnvelope`] unless the name has three
    /// non-empty segments.
    pub fn parse(value: impl Into<String>) -> Result<Self, RelayError> {
        let raw = value.into();
        let mut segments = raw.splitn(3, '_');
        let (Some(provider), Some(owner), Some(repo)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(RelayError::InvalidEnvelope {
                message: format!("mirror name '{raw}' is not of the form <provider>_<owner>_<repo>"),
            });
        };
        if provider.is_empty() || owner.is_empty() || repo.is_empty() {
            return Err(RelayError::InvalidEnvelope {
                message: format!("mirror name '{raw}' has an empty segment"),
            });
        }

        Ok(Self {
            provider: provider.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            raw,
        })
    }

    /// Provider tag, e.g. `github`. Case is preserved.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Repository owner (user or workspace).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name; may contain underscores.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Returns the mirror name as received.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for MirrorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

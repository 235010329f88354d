//! Observable session view and its persisted envelope.

use serde::{Deserialize, Serialize};

use super::{User, parse_object};
use crate::{DomainError, DomainResult};

/// The session state observers see.
///
/// Field names serialize in camelCase to match the persisted envelope
/// written by earlier web builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    /// The signed-in user, if any.
    #[serde(default)]
    pub user: Option<User>,

    /// True once a sign-in or rehydration succeeded and nothing cleared it.
    #[serde(default)]
    pub is_authenticated: bool,

    /// True only while a sign-out is in progress.
    #[serde(default)]
    pub is_loading: bool,
}

impl AuthSnapshot {
    /// The initial, signed-out state.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: false,
        }
    }

    /// A settled, signed-in state for `user`.
    #[must_use]
    pub const fn signed_in(user: User) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            is_loading: false,
        }
    }

    /// Returns the signed-in user's id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Versioned envelope stored under [`crate::keys::SNAPSHOT`].
///
/// ```json
/// {"state":{"user":null,"isAuthenticated":false,"isLoading":false},"version":0}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// The persisted session state.
    pub state: AuthSnapshot,

    /// Schema version of `state`.
    #[serde(default)]
    pub version: u32,
}

impl PersistedSnapshot {
    /// Schema version written by this build.
    pub const VERSION: u32 = 0;

    /// Wraps a snapshot in an envelope at the current version.
    #[must_use]
    pub const fn new(state: AuthSnapshot) -> Self {
        Self {
            state,
            version: Self::VERSION,
        }
    }

    /// Serializes the envelope to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(self).map_err(|e| DomainError::MalformedSnapshot(e.to_string()))
    }

    /// Parses an envelope and returns its state.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MalformedSnapshot`] for unparseable text and
    /// [`DomainError::UnsupportedSnapshotVersion`] when the version differs.
    pub fn from_json(text: &str) -> DomainResult<AuthSnapshot> {
        let envelope: Self = parse_object(text).map_err(DomainError::MalformedSnapshot)?;
        if envelope.version != Self::VERSION {
            return Err(DomainError::UnsupportedSnapshotVersion {
                found: envelope.version,
                expected: Self::VERSION,
            });
        }
        Ok(envelope.state)
    }
}

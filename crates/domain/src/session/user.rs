//! The authenticated principal.

use serde::{Deserialize, Serialize};

use super::parse_object;
use crate::{DomainError, DomainResult};

/// An authenticated principal.
///
/// Required fields default to empty when absent from stored JSON so that
/// [`User::validate`] decides the missing-field case rather than the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    #[serde(default)]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Email address.
    #[serde(default)]
    pub email: String,

    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Whether the identity provider verified the email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

impl User {
    /// Creates a user with the required fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            picture: None,
            email_verified: None,
        }
    }

    /// Sets the avatar URL.
    #[must_use]
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    /// Sets the email verification flag.
    #[must_use]
    pub const fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = Some(verified);
        self
    }

    /// Returns true if the record can restore a session: `id` and `email`
    /// are both non-empty.
    #[must_use]
    pub fn is_valid_for_rehydration(&self) -> bool {
        !self.id.is_empty() && !self.email.is_empty()
    }

    /// Checks the rehydration invariant.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidUser`] naming the first missing field.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.is_empty() {
            return Err(DomainError::InvalidUser("missing id".to_string()));
        }
        if self.email.is_empty() {
            return Err(DomainError::InvalidUser("missing email".to_string()));
        }
        Ok(())
    }

    /// Serializes the user to the compact JSON stored under
    /// [`crate::keys::USER`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_stored_json(&self) -> DomainResult<String> {
        serde_json::to_string(self).map_err(|e| DomainError::MalformedUser(e.to_string()))
    }

    /// Parses and validates stored user text.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MalformedUser`] if the text is not a JSON
    /// object of the user shape, or [`DomainError::InvalidUser`] if it
    /// parses but fails [`User::validate`].
    pub fn from_stored_json(text: &str) -> DomainResult<Self> {
        let user: Self = parse_object(text).map_err(DomainError::MalformedUser)?;
        user.validate()?;
        Ok(user)
    }
}

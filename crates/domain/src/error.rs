//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A user record is missing a required field.
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// Stored user text could not be parsed.
    #[error("malformed user record: {0}")]
    MalformedUser(String),

    /// A persisted session snapshot could not be read.
    #[error("malformed session snapshot: {0}")]
    MalformedSnapshot(String),

    /// A persisted session snapshot was written with another schema version.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshotVersion {
        /// Version found in storage.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

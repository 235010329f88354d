//! Threatmap Domain - Session types
//!
//! This crate defines the domain model for the client-side session store.
//! All types here are pure Rust with no I/O dependencies.

pub mod error;
pub mod session;

pub use error::{DomainError, DomainResult};
pub use session::{AuthSnapshot, PersistedSnapshot, User, keys};

//! Threatmap Application - Session store and ports
//!
//! This crate defines the application layer with:
//! - Port traits (interfaces for external dependencies)
//! - The session store and its observable subscription
//! - Application-level error handling

pub mod error;
pub mod ports;
pub mod session;

pub use error::{ApplicationError, ApplicationResult};
pub use ports::{KeyValueStorage, StorageError};
pub use session::{AuthStore, AuthStoreBuilder, Subscription};

//! Threatmap Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus runtime configuration.

pub mod persistence;
pub mod serialization;
pub mod settings;

pub use persistence::{FileStorage, MemoryStorage};
pub use serialization::{SerializationError, to_json_stable};
pub use settings::{ConfigError, StorageBackend, StorageConfig};

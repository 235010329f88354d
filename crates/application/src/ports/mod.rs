//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod key_value_storage;

pub use key_value_storage::{KeyValueStorage, StorageError};

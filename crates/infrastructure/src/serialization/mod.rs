//! JSON output for the storage file.

mod json;

pub use json::*;

//! Session domain types
//!
//! The signed-in principal, the observable session view, and the storage
//! keys the session is mirrored under.

pub mod keys;
mod snapshot;
mod user;

pub use snapshot::{AuthSnapshot, PersistedSnapshot};
pub use user::User;

/// Parses `text` as JSON and requires a top-level object. Derived
/// `Deserialize` impls also accept arrays positionally, which stored records
/// must never be.
pub(crate) fn parse_object<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, String> {
    match serde_json::from_str(text).map_err(|e| e.to_string())? {
        value @ serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(|e| e.to_string())
        }
        other => Err(format!("expected a JSON object, found {}", json_kind(&other))),
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

//! Storage keys shared with the browser-era layout.

/// Key holding the JSON-serialized signed-in user.
pub const USER: &str = "valyu_user";

/// Key holding the access token. Written by another component; the session
/// store only clears it on sign-out.
pub const ACCESS_TOKEN: &str = "valyu_access_token";

/// Default key for the persisted session snapshot envelope.
pub const SNAPSHOT: &str = "globalthreatmap-auth";

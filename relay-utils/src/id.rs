//! UUID generation, matching the v4 ids `relay-core` assigns to entities
//! (`Eid`) and websocket connections.

use uuid::Uuid;

/// A fresh random v4 identifier, formatted as a hyphenated string.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parses `s` as a UUID, returning `None` on malformed input rather than
/// panicking.
pub fn parse_id(s: &str) -> Option<Uuid> {
    Uuid::parse_str(s).ok()
}

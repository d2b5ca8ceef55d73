//! Shared wire-level types: the free-form parameter map, the `Any` payload
//! alias, and the `SlotResponse` envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// The free-form parameter map threaded through the whole dispatch pipeline.
pub type Map = serde_json::Map<String, Value>;

/// An opaque response payload.
pub type Any = Value;

/// Reserved keys recognized by the WebSocket connector and the slot engine.
pub mod reserved {
    pub const INIT_WS: &str = "INITWS";
    pub const WS_ID: &str = "WsID";
}

/// `{Data, Error}` — assigned atomically, never partially constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotResponse {
    pub data: Any,
    pub error: Option<RelayError>,
}

impl SlotResponse {
    pub fn new(data: Any, error: Option<RelayError>) -> Self {
        SlotResponse { data, error }
    }

    pub fn ok(data: Any) -> Self {
        SlotResponse { data, error: None }
    }

    pub fn err(error: RelayError) -> Self {
        SlotResponse {
            data: Value::Object(Map::new()),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `null` is encoded as an empty object, so response shape is preserved
    /// across transports that don't distinguish "no data" from "null".
    pub fn data_or_empty_object(&self) -> Any {
        if self.data.is_null() {
            Value::Object(Map::new())
        } else {
            self.data.clone()
        }
    }
}

/// Sentinel keys recognized in a slot's returned data map that trigger raw
/// byte delivery on the connector's return path (see the connector module).
pub mod file_envelope {
    pub const DOWNLOAD: &str = "FILE-DOWNLOAD";
    pub const PREVIEW: &str = "FILE-PREVIEW";
    pub const NAME: &str = "name";
    pub const DATA: &str = "data";
}

//! Data packer (§4.7): response encoding. JSON by default; `null` is
//! widened to an empty object so response shape is preserved across
//! transports.

use serde_json::Value;

use crate::error::{sentinel, RelayError};

pub trait DataPacker: Send + Sync {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>, RelayError>;
    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, RelayError>;
}

#[derive(Debug, Clone, Default)]
pub struct JsonPacker;

impl DataPacker for JsonPacker {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>, RelayError> {
        let value = if value.is_null() { Value::Object(Default::default()) } else { value.clone() };
        serde_json::to_vec(&value).map_err(|e| sentinel::sys_internal(format!("marshal failed: {e}")))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, RelayError> {
        serde_json::from_slice(bytes).map_err(|e| sentinel::caller_invalid_request(format!("unmarshal failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_is_widened_to_empty_object() {
        let packer = JsonPacker;
        let bytes = packer.marshal(&Value::Null).unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[test]
    fn roundtrips_arbitrary_values() {
        let packer = JsonPacker;
        let value = json!({"a": 1, "b": [true, "x"]});
        let bytes = packer.marshal(&value).unwrap();
        let back = packer.unmarshal(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn malformed_bytes_fail_invalid_request() {
        let packer = JsonPacker;
        let err = packer.unmarshal(b"not json").unwrap_err();
        assert_eq!(err.code, crate::error::Code::CallerInvalidRequest);
    }
}

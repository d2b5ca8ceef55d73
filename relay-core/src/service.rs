//! Service & Slot — the request-shaping contract described in §4.5: semantic
//! parameter types, per-field metadata, and the JSON-round-trip binding
//! rule. Slot *discovery* itself lives in the `relay-macros` crate
//! (`#[relay::service]` / `#[relay::slot]`), which generates the
//! `SlotDescriptor` table consumed here.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{sentinel, RelayError};
use crate::types::{reserved, Any, Map, SlotResponse};
use relay_rate_limit::InMemoryRateLimiter;

/// The closed enumeration of semantic parameter types (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Bool,
    String,
    Number,
    Bytes,
    Date,
    DateTime,
    StringArray,
    NumberArray,
    BytesArray,
    DateArray,
    DateTimeArray,
    NumberRange,
    DateRange,
    DateTimeRange,
    Object,
    ObjectArray,
}

fn is_date_string(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_datetime_string(s: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
}

impl SemanticType {
    /// Accepts `v` iff its shape matches this semantic type (§8 property 3).
    pub fn validate(self, v: &Value) -> bool {
        use SemanticType::*;
        match self {
            Bool => v.is_boolean(),
            String => v.is_string(),
            Number => v.is_number(),
            Bytes => v.is_string(), // base64/opaque-string payload
            Date => v.as_str().is_some_and(is_date_string),
            DateTime => v.as_str().is_some_and(is_datetime_string),
            StringArray => v.as_array().is_some_and(|a| a.iter().all(|e| e.is_string())),
            NumberArray => v.as_array().is_some_and(|a| a.iter().all(|e| e.is_number())),
            BytesArray => v.as_array().is_some_and(|a| a.iter().all(|e| e.is_string())),
            DateArray => v
                .as_array()
                .is_some_and(|a| a.iter().all(|e| e.as_str().is_some_and(is_date_string))),
            DateTimeArray => v
                .as_array()
                .is_some_and(|a| a.iter().all(|e| e.as_str().is_some_and(is_datetime_string))),
            NumberRange => v
                .as_array()
                .is_some_and(|a| a.len() == 2 && a.iter().all(|e| e.is_number())),
            DateRange => v
                .as_array()
                .is_some_and(|a| a.len() == 2 && a.iter().all(|e| e.as_str().is_some_and(is_date_string))),
            DateTimeRange => v
                .as_array()
                .is_some_and(|a| a.len() == 2 && a.iter().all(|e| e.as_str().is_some_and(is_datetime_string))),
            Object => v.is_object(),
            ObjectArray => v.as_array().is_some_and(|a| a.iter().all(|e| e.is_object())),
        }
    }
}

/// Per-field metadata, one per field of a typed slot request struct.
#[derive(Debug, Clone)]
pub struct SlotParameter {
    /// Wire key (the `rename`d name, defaulting to the field name).
    pub name: &'static str,
    pub require: bool,
    pub insensitive_case: bool,
    /// A `garde`-style validation expression name, resolved by the
    /// generated binder; `None` when no `validate` attribute is present.
    pub validate: Option<&'static str>,
    pub ty: Option<SemanticType>,
}

/// Implemented by `#[derive(SlotRequest)]` on a typed request struct. The
/// derive emits `PARAMS` (the field metadata) and `bind`, which performs the
/// shaping described in §4.5 and the JSON round-trip into `Self`.
pub trait SlotRequest: DeserializeOwned {
    const PARAMS: &'static [SlotParameter];

    /// Shapes `params` per §4.5 and deserializes the result into `Self`.
    fn bind(mut params: Map) -> Result<Self, RelayError> {
        shape_params(&mut params, Self::PARAMS)?;
        serde_json::from_value(Value::Object(params))
            .map_err(|e| sentinel::caller_invalid_request(format!("malformed request body: {e}")))
    }
}

/// Applies the four shaping invariants from §4.5 to `params` in place:
/// case-insensitive rekeying, required-field checks, semantic-type
/// validation, and `"true"`/`"false"` string-to-bool coercion. Unknown keys
/// are preserved untouched.
pub fn shape_params(params: &mut Map, schema: &[SlotParameter]) -> Result<(), RelayError> {
    // A WebSocket handshake call suppresses validation entirely.
    if params
        .get(reserved::INIT_WS)
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Ok(());
    }

    // Case-insensitive lookup table built once per call (schemas are small).
    let lower_index: HashMap<String, String> = params
        .keys()
        .map(|k| (k.to_lowercase(), k.clone()))
        .collect();

    for field in schema {
        let mut found_key = params.contains_key(field.name).then(|| field.name.to_string());

        if found_key.is_none() && field.insensitive_case {
            if let Some(original) = lower_index.get(&field.name.to_lowercase()) {
                if original != field.name {
                    if let Some(v) = params.remove(original) {
                        params.insert(field.name.to_string(), v);
                    }
                }
                found_key = Some(field.name.to_string());
            }
        }

        match found_key {
            None => {
                if field.require {
                    return Err(sentinel::caller_invalid_request(format!(
                        "required parameter '{}' is missing",
                        field.name
                    )));
                }
            }
            Some(key) => {
                coerce_bool_strings(params, &key);
                if let Some(ty) = field.ty {
                    let value = params.get(&key).expect("just located");
                    if !value.is_null() && !ty.validate(value) {
                        return Err(sentinel::caller_invalid_request(format!(
                            "parameter '{key}' does not match its declared type"
                        )));
                    }
                }
                // `validate` expressions are evaluated by the generated
                // binder against the concrete field type, since `garde`
                // validates typed values, not raw JSON — see the derive
                // macro in `relay-macros`.
            }
        }
    }

    Ok(())
}

fn coerce_bool_strings(params: &mut Map, key: &str) {
    if let Some(Value::String(s)) = params.get(key) {
        match s.as_str() {
            "true" => {
                params.insert(key.to_string(), Value::Bool(true));
            }
            "false" => {
                params.insert(key.to_string(), Value::Bool(false));
            }
            _ => {}
        }
    }
}

/// A discovered slot: a name plus the invocation closure produced by the
/// `#[relay::slot]` macro. `Map` is the erasure point between the typed
/// request struct and the dispatch engine.
pub struct SlotDescriptor<S> {
    pub name: &'static str,
    pub handler: Box<dyn Fn(&S, Map) -> Result<crate::types::Any, RelayError> + Send + Sync>,
}

/// Object-safe invocation surface for a discovered slot, implemented by the
/// code the `#[relay::service]`/`#[relay::slot]` macros generate for each
/// annotated impl block.
#[async_trait::async_trait]
pub trait Service: Entity {
    /// Globally unique service name.
    fn service_name(&self) -> &str;

    /// `slot:rps` entries plus an optional bare `rps` service-wide cap, as
    /// found in the `LimitedSlots` config field.
    fn limited_slots(&self) -> &str {
        ""
    }

    /// `true` if `slot` names a discovered slot on this service.
    fn has_slot(&self, slot: &str) -> bool;

    /// Invokes `slot` with already-shaped `params`. Implementations perform
    /// the JSON round-trip into the slot's typed request (or pass the raw
    /// map through, for `Map`-typed slots) and call the handler.
    async fn invoke_slot(&self, slot: &str, params: Map) -> SlotResponse;
}

/// Parses the `LimitedSlots` config string (`"slotName:rps,otherSlot:rps,rps"`)
/// into a (service-wide cap, per-slot overrides) pair. Rate 0 means "use the
/// default" (100 rps), per §4.5.
pub const DEFAULT_RPS: u64 = 100;

pub struct SlotLimits {
    pub service_wide: u64,
    pub per_slot: HashMap<String, u64>,
}

pub fn parse_limited_slots(spec: &str) -> SlotLimits {
    let mut service_wide = DEFAULT_RPS;
    let mut per_slot = HashMap::new();

    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once(':') {
            Some((slot, rate)) => {
                let rate: u64 = rate.trim().parse().unwrap_or(0);
                per_slot.insert(slot.trim().to_string(), if rate == 0 { DEFAULT_RPS } else { rate });
            }
            None => {
                let rate: u64 = entry.parse().unwrap_or(0);
                service_wide = if rate == 0 { DEFAULT_RPS } else { rate };
            }
        }
    }

    SlotLimits { service_wide, per_slot }
}

/// Per-service rate limiting: a service-wide limiter plus per-slot
/// overrides, built once at service-open time and read-mostly thereafter
/// (§5: "built at open time and never mutated afterward").
pub struct ServiceLimiter {
    limits: SlotLimits,
    backend: InMemoryRateLimiter,
}

impl ServiceLimiter {
    pub fn new(limited_slots: &str) -> Self {
        ServiceLimiter {
            limits: parse_limited_slots(limited_slots),
            backend: InMemoryRateLimiter::new(),
        }
    }

    /// Blocks (cooperatively awaits) until a token is available for `slot`,
    /// preferring the per-slot override over the service-wide cap.
    pub async fn acquire(&self, slot: &str) {
        let rps = self.limits.per_slot.get(slot).copied().unwrap_or(self.limits.service_wide);
        self.backend.acquire(slot, rps, 1).await;
    }
}

#[allow(dead_code)]
fn _assert_any_is_json(_: Any) {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_missing_fails_invalid_request() {
        let schema = [SlotParameter {
            name: "name",
            require: true,
            insensitive_case: false,
            validate: None,
            ty: None,
        }];
        let mut params = Map::new();
        let err = shape_params(&mut params, &schema).unwrap_err();
        assert_eq!(err.code, crate::error::Code::CallerInvalidRequest);
    }

    #[test]
    fn insensitive_lookup_rekeys_to_canonical_name() {
        let schema = [SlotParameter {
            name: "Name",
            require: true,
            insensitive_case: true,
            validate: None,
            ty: None,
        }];
        let mut params = Map::new();
        params.insert("name".to_string(), Value::from("world"));
        shape_params(&mut params, &schema).unwrap();
        assert_eq!(params.get("Name"), Some(&Value::from("world")));
        assert!(!params.contains_key("name"));
    }

    #[test]
    fn bool_string_coercion() {
        let schema = [SlotParameter {
            name: "Flag",
            require: false,
            insensitive_case: false,
            validate: None,
            ty: Some(SemanticType::Bool),
        }];
        let mut params = Map::new();
        params.insert("Flag".to_string(), Value::from("true"));
        shape_params(&mut params, &schema).unwrap();
        assert_eq!(params.get("Flag"), Some(&Value::Bool(true)));
    }

    #[test]
    fn number_range_requires_exactly_two_numeric_elements() {
        assert!(SemanticType::NumberRange.validate(&serde_json::json!([1, 2])));
        assert!(!SemanticType::NumberRange.validate(&serde_json::json!([1, 2, 3])));
        assert!(!SemanticType::NumberRange.validate(&serde_json::json!(["a", "b"])));
    }

    #[test]
    fn initws_suppresses_validation() {
        let schema = [SlotParameter {
            name: "name",
            require: true,
            insensitive_case: false,
            validate: None,
            ty: None,
        }];
        let mut params = Map::new();
        params.insert(reserved::INIT_WS.to_string(), Value::Bool(true));
        shape_params(&mut params, &schema).unwrap();
    }

    #[test]
    fn unknown_parameters_are_preserved() {
        let schema: [SlotParameter; 0] = [];
        let mut params = Map::new();
        params.insert("extra".to_string(), Value::from(1));
        shape_params(&mut params, &schema).unwrap();
        assert_eq!(params.get("extra"), Some(&Value::from(1)));
    }
}

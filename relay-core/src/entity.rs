//! Entity & EntityStub — the uniform lifecycle, identity, and management
//! surface shared by every pluggable component (service, router, gateway,
//! connector, middleware, packer, server, plugin).

use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use uuid::Uuid;

use crate::error::{sentinel, RelayError};
use crate::types::Map;

/// The kind of pluggable component an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Service,
    Gateway,
    Server,
    Connector,
    Plugin,
    Router,
    Middleware,
    DataPacker,
}

/// Process-assigned, immutable-after-first-access identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eid(pub Uuid);

impl Eid {
    fn fresh() -> Self {
        Eid(Uuid::new_v4())
    }
}

/// Lazily-assigned identity metadata for an entity. The EID is assigned on
/// first access and then immutable, mirroring the "assign once, persist"
/// contract of the original system (config persistence of the EID is left to
/// callers that want that durability; in-process identity is guaranteed
/// here).
pub struct EntityMeta {
    class: &'static str,
    entity_type: EntityType,
    server_eid: Option<Eid>,
    disabled: bool,
    eid: OnceLock<Eid>,
}

impl EntityMeta {
    pub fn new(class: &'static str, entity_type: EntityType) -> Self {
        EntityMeta {
            class,
            entity_type,
            server_eid: None,
            disabled: false,
            eid: OnceLock::new(),
        }
    }

    pub fn with_server_eid(mut self, server_eid: Eid) -> Self {
        self.server_eid = Some(server_eid);
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Assigns the EID on first call; subsequent calls return the same value.
    pub fn eid(&self) -> Eid {
        *self.eid.get_or_init(Eid::fresh)
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn server_eid(&self) -> Option<Eid> {
        self.server_eid
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }
}

/// Schema-described config access for an entity, replacing the source
/// system's reflective field read/write with an explicit key/value map.
/// Concrete entities provide their own config struct and implement this
/// trait (typically via a small derive or hand-written impl) to expose it
/// to the generic `EntityStub` actions.
/// Entities are shared behind `Arc` throughout the router/gateway, so config
/// mutation goes through `&self` — implementations that hold any state use
/// interior mutability (a `Mutex`/`RwLock`-wrapped field), the same way the
/// rest of the kernel's shared registries do.
pub trait EntityConfig: Send + Sync {
    /// Returns the current value of `key` (may be a dotted path, e.g.
    /// `Connections.primary.host`), or `None` if unknown.
    fn get_item(&self, key: &str) -> Option<Value>;

    /// Applies a kind-aware-coerced value to `key`. Returns an error if the
    /// key is unknown or the value cannot be coerced into the field's type.
    fn set_item(&self, key: &str, value: Value) -> Result<(), RelayError>;

    /// Restores defaults. Entities without a meaningful default return
    /// `SysInternal` (matches §4.1: "unimplemented -> fail with SysInternal").
    fn reset(&self) -> Result<(), RelayError> {
        Err(sentinel::sys_internal("reset_config not implemented"))
    }

    /// Serializes the whole config section, used by `GetConfig`.
    fn to_value(&self) -> Value;
}

/// Management actions exposed by every `EntityStub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    Ping,
    GetLoad,
    GetConfig,
    GetConfigItems,
    UpdateConfigItems,
    ResetConfig,
}

impl ManageAction {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Ping" => ManageAction::Ping,
            "GetLoad" => ManageAction::GetLoad,
            "GetConfig" => ManageAction::GetConfig,
            "GetConfigItems" => ManageAction::GetConfigItems,
            "UpdateConfigItems" => ManageAction::UpdateConfigItems,
            "ResetConfig" => ManageAction::ResetConfig,
            _ => return None,
        })
    }
}

/// Current instantaneous load of an entity, returned by `GetLoad`. Concrete
/// entities may report richer metrics; the default is a conservative zero.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Load {
    pub active_requests: u64,
}

/// A non-owning management capability attached to every entity. The stub
/// holds only the entity's EID (see §9 design notes: "use a weak
/// reference... the stub holds a non-owning pointer/index to its owner");
/// it is handed the owning entity's `EntityConfig` at call time rather than
/// holding a strong reference back to it. Routers reach it through
/// [`EntityIndex`]-backed lookups — see `LocalRouter::manage_entity`.
pub struct EntityStub {
    owner_eid: Eid,
    ping: Option<Box<dyn Fn() -> bool + Send + Sync>>,
    get_load: Option<Box<dyn Fn() -> Load + Send + Sync>>,
}

impl EntityStub {
    pub fn new(owner_eid: Eid) -> Self {
        EntityStub {
            owner_eid,
            ping: None,
            get_load: None,
        }
    }

    pub fn with_ping(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.ping = Some(Box::new(f));
        self
    }

    pub fn with_get_load(mut self, f: impl Fn() -> Load + Send + Sync + 'static) -> Self {
        self.get_load = Some(Box::new(f));
        self
    }

    pub fn owner_eid(&self) -> Eid {
        self.owner_eid
    }

    /// Dispatches `action` against `config`. Unknown actions fail with
    /// `CallerInvalidRequest`.
    pub fn manage(
        &self,
        config: &dyn EntityConfig,
        action: &str,
        params: &Map,
    ) -> Result<Value, RelayError> {
        let action = ManageAction::from_name(action)
            .ok_or_else(|| sentinel::caller_invalid_request(format!("unknown action {action}")))?;

        match action {
            ManageAction::Ping => {
                let alive = self.ping.as_ref().map(|f| f()).unwrap_or(true);
                Ok(Value::Bool(alive))
            }
            ManageAction::GetLoad => {
                let load = self.get_load.as_ref().map(|f| f()).unwrap_or_default();
                Ok(serde_json::to_value(load).expect("Load always serializes"))
            }
            ManageAction::GetConfig => Ok(config.to_value()),
            ManageAction::GetConfigItems => {
                let keys = params
                    .get("keys")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut out = Map::new();
                for key in keys {
                    if let Some(k) = key.as_str() {
                        if let Some(v) = config.get_item(k) {
                            out.insert(k.to_string(), v);
                        }
                    }
                }
                Ok(Value::Object(out))
            }
            ManageAction::UpdateConfigItems => {
                for (key, value) in params.iter() {
                    config.set_item(key, value.clone())?;
                }
                Ok(Value::Bool(true))
            }
            ManageAction::ResetConfig => {
                config.reset()?;
                Ok(Value::Bool(true))
            }
        }
    }
}

/// The uniform interface implemented by every pluggable component.
pub trait Entity: Send + Sync {
    fn class(&self) -> &'static str;
    fn meta(&self) -> &EntityMeta;
    fn config(&self) -> &dyn EntityConfig;
    fn stub(&self) -> &EntityStub;
}

/// Kind-aware coercion helper for `EntityConfig::set_item` implementations:
/// widens/narrows numeric kinds across int/float, and accepts both
/// `YYYY-MM-DD` and `YYYY-MM-DD HH:MM:SS` strings (or a Unix-seconds number)
/// wherever a timestamp is expected.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Parses a config value into a Unix timestamp (seconds), accepting
/// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or a bare numeric Unix timestamp.
pub fn coerce_timestamp(value: &Value) -> Result<i64, RelayError> {
    use chrono::NaiveDate;

    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| sentinel::caller_invalid_request("timestamp must be an integer")),
        Value::String(s) => {
            if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Ok(dt.and_utc().timestamp());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Ok(d
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always valid")
                    .and_utc()
                    .timestamp());
            }
            Err(sentinel::caller_invalid_request(format!("unrecognized timestamp {s}")))
        }
        _ => Err(sentinel::caller_invalid_request("timestamp must be a string or number")),
    }
}

/// Splits a dotted config path (`Connections.primary.host`) into segments,
/// the single canonical syntax for nested `UpdateConfigItems` keys.
pub fn split_config_path(key: &str) -> Vec<&str> {
    key.split('.').collect()
}

/// Process-wide registry of entity stubs indexed by EID, used by the router
/// to implement `manage_entity`.
#[derive(Default)]
pub struct EntityIndex {
    stubs: Mutex<std::collections::HashMap<Eid, ()>>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, eid: Eid) {
        self.stubs.lock().expect("entity index poisoned").insert(eid, ());
    }

    pub fn contains(&self, eid: &Eid) -> bool {
        self.stubs.lock().expect("entity index poisoned").contains_key(eid)
    }
}

//! Pure in-process dispatch (§4.2.1).

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::entity::{Eid, EntityIndex};
use crate::error::{sentinel, RelayError};
use crate::server::Server;
use crate::service::{Service, ServiceLimiter};
use crate::types::{Map, SlotResponse};

use super::Router;

#[derive(Default)]
pub struct LocalRouter {
    services: DashMap<String, Arc<dyn Service>>,
    by_eid: DashMap<Eid, Arc<dyn Service>>,
    limiters: DashMap<String, Arc<ServiceLimiter>>,
    entities: EntityIndex,
    debug: bool,
}

impl LocalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// In debug mode, a handler panic is allowed to unwind rather than being
    /// converted to `SysUnhandled` (§4.3/§7).
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).map(|r| r.clone())
    }
}

#[async_trait::async_trait]
impl Router for LocalRouter {
    async fn register_service(&self, service: Arc<dyn Service>) -> Result<(), RelayError> {
        let name = service.service_name().to_string();
        if self.services.contains_key(&name) {
            return Err(sentinel::sys_internal(format!("service '{name}' is already registered")));
        }
        self.by_eid.insert(service.meta().eid(), service.clone());
        self.limiters.insert(name.clone(), Arc::new(ServiceLimiter::new(service.limited_slots())));
        self.services.insert(name, service);
        Ok(())
    }

    fn unregister_service(&self, name: &str) {
        if let Some((_, service)) = self.services.remove(name) {
            self.by_eid.remove(&service.meta().eid());
        }
        self.limiters.remove(name);
    }

    async fn request_service(&self, service: &str, slot: &str, params: Map) -> SlotResponse {
        let Some(svc) = self.services.get(service).map(|r| r.clone()) else {
            return SlotResponse::err(sentinel::caller_invalid_request(format!("service '{service}' not available")));
        };
        if svc.meta().disabled() {
            return SlotResponse::err(sentinel::caller_invalid_request(format!("service '{service}' not available")));
        }
        if !svc.has_slot(slot) {
            return SlotResponse::err(sentinel::caller_invalid_request(format!("slot '{slot}' not available")));
        }

        if let Some(limiter) = self.limiters.get(service).map(|r| r.clone()) {
            limiter.acquire(slot).await;
        }

        match Server::isolate_future(self.debug, svc.invoke_slot(slot, params)).await {
            Ok(resp) => resp,
            Err(err) => SlotResponse::err(err),
        }
    }

    fn register_entity(&self, eid: Eid) {
        self.entities.register(eid);
    }

    fn entity_index(&self) -> &EntityIndex {
        &self.entities
    }

    fn manage_entity(&self, eid: Eid, action: &str, params: &Map) -> Result<Value, RelayError> {
        let Some(svc) = self.by_eid.get(&eid).map(|r| r.clone()) else {
            return Err(sentinel::caller_invalid_request("unknown entity"));
        };
        svc.stub().manage(svc.config(), action, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityConfig, EntityMeta, EntityStub, EntityType};
    use serde_json::Value;

    struct EchoConfig;
    impl EntityConfig for EchoConfig {
        fn get_item(&self, _key: &str) -> Option<Value> {
            None
        }
        fn set_item(&self, _key: &str, _value: Value) -> Result<(), RelayError> {
            Ok(())
        }
        fn to_value(&self) -> Value {
            Value::Object(Default::default())
        }
    }

    struct EchoService {
        meta: EntityMeta,
        config: EchoConfig,
        stub: EntityStub,
        limited_slots: &'static str,
        panics: bool,
    }

    impl crate::entity::Entity for EchoService {
        fn class(&self) -> &'static str {
            "Echo"
        }
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn config(&self) -> &dyn EntityConfig {
            &self.config
        }
        fn stub(&self) -> &EntityStub {
            &self.stub
        }
    }

    #[async_trait::async_trait]
    impl Service for EchoService {
        fn service_name(&self) -> &str {
            "Echo"
        }
        fn limited_slots(&self) -> &str {
            self.limited_slots
        }
        fn has_slot(&self, slot: &str) -> bool {
            slot == "EchoSlot"
        }
        async fn invoke_slot(&self, _slot: &str, params: Map) -> SlotResponse {
            if self.panics {
                panic!("boom");
            }
            SlotResponse::ok(Value::Object(params))
        }
    }

    fn make_echo() -> Arc<dyn Service> {
        let meta = EntityMeta::new("Echo", EntityType::Service);
        Arc::new(EchoService {
            stub: EntityStub::new(meta.eid()),
            meta,
            config: EchoConfig,
            limited_slots: "",
            panics: false,
        })
    }

    #[tokio::test]
    async fn duplicate_service_name_fails_sys_internal() {
        let router = LocalRouter::new();
        router.register_service(make_echo()).await.unwrap();
        let err = router.register_service(make_echo()).await.unwrap_err();
        assert_eq!(err.code, crate::error::Code::SysInternal);
    }

    #[tokio::test]
    async fn unknown_service_is_invalid_request() {
        let router = LocalRouter::new();
        let resp = router.request_service("Missing", "Slot", Map::new()).await;
        assert_eq!(resp.error.unwrap().code, crate::error::Code::CallerInvalidRequest);
    }

    #[tokio::test]
    async fn unknown_slot_is_invalid_request() {
        let router = LocalRouter::new();
        router.register_service(make_echo()).await.unwrap();
        let resp = router.request_service("Echo", "Missing", Map::new()).await;
        assert_eq!(resp.error.unwrap().code, crate::error::Code::CallerInvalidRequest);
    }

    #[tokio::test]
    async fn happy_path_dispatches_to_slot() {
        let router = LocalRouter::new();
        router.register_service(make_echo()).await.unwrap();
        let mut params = Map::new();
        params.insert("name".to_string(), Value::from("world"));
        let resp = router.request_service("Echo", "EchoSlot", params).await;
        assert!(resp.is_ok());
        assert_eq!(resp.data["name"], Value::from("world"));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_sys_unhandled_outside_debug_mode() {
        let router = LocalRouter::new();
        let meta = EntityMeta::new("Echo", EntityType::Service);
        let svc = Arc::new(EchoService {
            stub: EntityStub::new(meta.eid()),
            meta,
            config: EchoConfig,
            limited_slots: "",
            panics: true,
        });
        router.register_service(svc).await.unwrap();
        let resp = router.request_service("Echo", "EchoSlot", Map::new()).await;
        assert_eq!(resp.error.unwrap().code, crate::error::Code::SysUnhandled);
    }

    #[tokio::test]
    async fn per_slot_rate_limit_is_enforced_on_dispatch() {
        let router = LocalRouter::new();
        let meta = EntityMeta::new("Echo", EntityType::Service);
        let svc = Arc::new(EchoService {
            stub: EntityStub::new(meta.eid()),
            meta,
            config: EchoConfig,
            limited_slots: "EchoSlot:1",
            panics: false,
        });
        router.register_service(svc).await.unwrap();

        router.request_service("Echo", "EchoSlot", Map::new()).await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            router.request_service("Echo", "EchoSlot", Map::new()),
        )
        .await;
        assert!(second.is_err(), "second call should have blocked on the exhausted bucket");
    }

    #[tokio::test]
    async fn manage_entity_delegates_to_the_owning_stub() {
        let router = LocalRouter::new();
        let meta = EntityMeta::new("Echo", EntityType::Service);
        let eid = meta.eid();
        router.register_service(make_echo_with(meta)).await.unwrap();

        let result = router.manage_entity(eid, "Ping", &Map::new()).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[tokio::test]
    async fn manage_entity_unknown_eid_is_invalid_request() {
        let router = LocalRouter::new();
        let unknown = EntityMeta::new("Nowhere", EntityType::Service).eid();
        let err = router.manage_entity(unknown, "Ping", &Map::new()).unwrap_err();
        assert_eq!(err.code, crate::error::Code::CallerInvalidRequest);
    }

    fn make_echo_with(meta: EntityMeta) -> Arc<dyn Service> {
        Arc::new(EchoService {
            stub: EntityStub::new(meta.eid()),
            meta,
            config: EchoConfig,
            limited_slots: "",
            panics: false,
        })
    }
}

use std::sync::Arc;

use relay_core::connector::http::{HttpConnector, HttpConnectorConfig};
use relay_core::connector::Connector;
use relay_core::entity::{EntityConfig, EntityMeta, EntityStub, EntityType};
use relay_core::error::RelayError;
use relay_core::gateway::{Api, ApiDescriptor, EndPoint, Gateway, GatewayConfig};
use relay_core::router::{LocalRouter, Router};
use relay_core::service::Service;
use relay_core::types::{Map, SlotResponse};
use relay_test::TestApp;
use serde_json::{json, Value};

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
}

impl relay_core::entity::Entity for EchoService {
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
    fn has_slot(&self, slot: &str) -> bool {
        slot == "Echo"
    }
    async fn invoke_slot(&self, _slot: &str, params: Map) -> SlotResponse {
        SlotResponse::ok(Value::Object(params))
    }
}

async fn echo_app() -> TestApp {
    let router: Arc<dyn Router> = Arc::new(LocalRouter::new());
    let meta = EntityMeta::new("Echo", EntityType::Service);
    let service = Arc::new(EchoService { stub: EntityStub::new(meta.eid()), meta, config: EchoConfig });
    router.register_service(service).await.unwrap();

    let mut apis = ApiDescriptor::new();
    apis.register(
        "v1",
        Api { name: "Hello".to_string(), desc: String::new(), disabled: false, endpoint: EndPoint { service: "Echo".to_string(), slot: "Echo".to_string() } },
    );

    let gateway = Arc::new(Gateway::new(apis, router, GatewayConfig::default()));
    let connector = HttpConnector::new(HttpConnectorConfig::default());
    TestApp::new(connector.app(gateway))
}

#[tokio::test]
async fn post_json_round_trips_through_the_envelope() {
    let app = echo_app().await;
    app.post_json("/v1/Hello", &json!({"name": "world"}))
        .await
        .assert_ok();
}

#[tokio::test]
async fn response_data_carries_the_echoed_payload() {
    let app = echo_app().await;
    let resp = app.post_json("/v1/Hello", &json!({"name": "world"})).await;
    assert_eq!(resp.data()["name"], json!("world"));
    assert!(resp.error().is_null());
}

#[tokio::test]
async fn unknown_api_surfaces_an_error_envelope() {
    let app = echo_app().await;
    let resp = app.get("/v1/Missing").await.assert_ok();
    assert!(!resp.error().is_null());
}

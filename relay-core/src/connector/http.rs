//! HTTP connector (§4.6, §6): `GET|POST /<version>/<api>`, the `{data,
//! error}` response envelope, the file-download/preview envelope, and the
//! debug-mode error-fingerprint endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes as AxumBytes;
use axum::extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router as AxumRouter};
use serde_json::Value;

use crate::error::fingerprint_table;
use crate::gateway::{CallerContext, Gateway};
use crate::packer::{DataPacker, JsonPacker};
use crate::types::{file_envelope, Map};

use super::ws::{handle_socket, WsTable};
use super::Connector;

#[derive(Debug, Clone)]
pub struct HttpConnectorConfig {
    /// Param key under which the caller's address is recorded.
    pub client_ip_field: String,
    pub debug: bool,
    /// `Some((version, api))` of the gateway endpoint the `/ws` upgrade
    /// route forwards to, when the WebSocket sub-protocol is enabled.
    pub ws_endpoint: Option<(String, String)>,
    /// This connector's language, used to select the i18n dictionary the
    /// gateway translates error `Desc`s through (§4.4 step 5, §7).
    pub lang: Option<String>,
}

impl Default for HttpConnectorConfig {
    fn default() -> Self {
        HttpConnectorConfig { client_ip_field: "Address".to_string(), debug: false, ws_endpoint: None, lang: None }
    }
}

pub struct HttpConnector {
    config: HttpConnectorConfig,
    packer: Arc<dyn DataPacker>,
    ws_table: Arc<WsTable>,
}

impl HttpConnector {
    pub fn new(config: HttpConnectorConfig) -> Self {
        HttpConnector { config, packer: Arc::new(JsonPacker), ws_table: Arc::new(WsTable::new()) }
    }

    pub fn with_packer(mut self, packer: Arc<dyn DataPacker>) -> Self {
        self.packer = packer;
        self
    }
}

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    config: Arc<HttpConnectorConfig>,
    packer: Arc<dyn DataPacker>,
    ws_table: Arc<WsTable>,
}

impl Connector for HttpConnector {
    fn app(&self, gateway: Arc<Gateway>) -> AxumRouter {
        let state = AppState {
            gateway,
            config: Arc::new(self.config.clone()),
            packer: self.packer.clone(),
            ws_table: self.ws_table.clone(),
        };

        let mut router = AxumRouter::new().route("/{version}/{api}", any(dispatch));

        if state.config.ws_endpoint.is_some() {
            router = router.route("/ws", any(ws_upgrade));
        }

        if state.config.debug {
            router = router
                .route("/error/query/{fingerprint}", get(error_query))
                .route("/error/statics", get(error_statics));
        }

        router.with_state(state)
    }
}

async fn dispatch(
    State(state): State<AppState>,
    Path((version, api)): Path<(String, String)>,
    Query(query): Query<Map>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Response {
    let mut params = query;

    if !body.is_empty() {
        if let Ok(Value::Object(form)) = serde_json::from_slice::<Value>(&body) {
            params.extend(form);
        }
    }

    if let Some(user) = headers.get("X-User").and_then(|v| v.to_str().ok()) {
        params.insert("User".to_string(), Value::from(user));
    }
    params.insert(state.config.client_ip_field.clone(), Value::from(addr.ip().to_string()));

    let caller = CallerContext { client_ip: addr.ip().to_string(), user: String::new(), lang: state.config.lang.clone() };
    let resp = state.gateway.request_api(&version, &api, params, &caller).await;

    if let Value::Object(map) = &resp.data {
        let is_download = map.get(file_envelope::DOWNLOAD).and_then(Value::as_bool).unwrap_or(false);
        let is_preview = map.get(file_envelope::PREVIEW).and_then(Value::as_bool).unwrap_or(false);
        if is_download || is_preview {
            return file_response(map, is_download, &state.packer);
        }
    }

    let body = match state.packer.marshal(&serde_json::to_value(&resp).unwrap_or(Value::Null)) {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn file_response(map: &Map, download: bool, packer: &Arc<dyn DataPacker>) -> Response {
    let name = map.get(file_envelope::NAME).and_then(Value::as_str).unwrap_or("file").to_string();
    let data = match map.get(file_envelope::DATA) {
        Some(Value::String(s)) => s.clone().into_bytes(),
        Some(other) => match packer.marshal(other) {
            Ok(bytes) => bytes,
            Err(err) => return err.into_response(),
        },
        None => Vec::new(),
    };

    let disposition = if download {
        format!("attachment; filename=\"{name}\"")
    } else {
        format!("inline; filename=\"{name}\"")
    };

    (
        [(header::CONTENT_TYPE, "application/octet-stream".to_string()), (header::CONTENT_DISPOSITION, disposition)],
        data,
    )
        .into_response()
}

async fn ws_upgrade(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, ws: WebSocketUpgrade) -> Response {
    let (version, api) = state.config.ws_endpoint.clone().expect("route only mounted when configured");
    let gateway = state.gateway.clone();
    let table = state.ws_table.clone();
    let address_field = state.config.client_ip_field.clone();
    let client_addr = addr.ip().to_string();

    ws.on_upgrade(move |socket| handle_socket(socket, gateway, table, version, api, address_field, client_addr))
}

async fn error_query(State(_state): State<AppState>, Path(fingerprint): Path<String>) -> Json<Value> {
    match fingerprint_table().query(&fingerprint) {
        Some(entry) => Json(serde_json::to_value(entry).unwrap_or(Value::Null)),
        None => Json(Value::Null),
    }
}

async fn error_statics(State(_state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(fingerprint_table().statics()).unwrap_or(Value::Null))
}

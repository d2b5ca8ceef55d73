//! The gateway (§4.4): resolves `(version, api)` via the API descriptor,
//! runs the middleware chain around the router dispatch, and optionally
//! guards the call with a circuit breaker.

pub mod breaker;
pub mod builtin;
pub mod i18n;
pub mod middleware;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{sentinel, RelayError};
use crate::router::Router;
use crate::types::{Any, Map, SlotResponse};

use breaker::{Admission, BreakerConfig, CircuitBreaker};
use i18n::Translator;
use middleware::{run_in_chain, run_out_chain, Middleware};

/// `(service, slot)` an API name resolves to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndPoint {
    pub service: String,
    pub slot: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub disabled: bool,
    pub endpoint: EndPoint,
}

/// `{version -> {name -> API}}`, loaded once from `api.json` at startup.
#[derive(Debug, Clone, Default)]
pub struct ApiDescriptor {
    versions: HashMap<String, HashMap<String, Api>>,
}

impl ApiDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, version: impl Into<String>, api: Api) {
        self.versions.entry(version.into()).or_default().insert(api.name.clone(), api);
    }

    pub fn resolve(&self, version: &str, name: &str) -> Result<&Api, RelayError> {
        let api = self
            .versions
            .get(version)
            .and_then(|apis| apis.get(name))
            .ok_or_else(|| sentinel::caller_invalid_request(format!("unknown api {version}/{name}")))?;
        if api.disabled {
            return Err(sentinel::caller_invalid_request(format!("api {version}/{name} is disabled")));
        }
        Ok(api)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub circuit_breaker_enabled: bool,
    pub breaker: BreakerConfig,
}

/// Identifies the caller, used both for the circuit-breaker command name and
/// passed to built-in middlewares (§4.4.2 Locker/Session). `lang` is the
/// connector-level language (§7), consulted by the i18n translation step.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub client_ip: String,
    pub user: String,
    pub lang: Option<String>,
}

pub struct Gateway {
    apis: ApiDescriptor,
    middlewares: Vec<Box<dyn Middleware>>,
    router: Arc<dyn Router>,
    config: GatewayConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    seq: AtomicU64,
    translator: Option<Translator>,
}

impl Gateway {
    pub fn new(apis: ApiDescriptor, router: Arc<dyn Router>, config: GatewayConfig) -> Self {
        Gateway {
            apis,
            middlewares: Vec::new(),
            router,
            config,
            breakers: DashMap::new(),
            seq: AtomicU64::new(0),
            translator: None,
        }
    }

    pub fn with_middleware(mut self, mw: Box<dyn Middleware>) -> Self {
        self.middlewares.push(mw);
        self
    }

    /// Attaches the i18n translator consulted in step 5 of `request_api`
    /// (§4.4, §7): a connector-language error `Desc` is translated, `Code`
    /// and `Cause` are not.
    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = Some(translator);
        self
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn breaker_for(&self, command: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(command.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.breaker.clone())))
            .clone()
    }

    /// The full §4.4 pipeline: resolve → IN chain → dispatch (optionally
    /// breaker-guarded) → OUT chain.
    pub async fn request_api(
        &self,
        version: &str,
        api_name: &str,
        mut params: Map,
        caller: &CallerContext,
    ) -> SlotResponse {
        let seq = self.next_seq();

        let api = match self.apis.resolve(version, api_name) {
            Ok(api) => api.clone(),
            Err(err) => return SlotResponse::err(err),
        };

        match run_in_chain(&self.middlewares, seq, version, api_name, &mut params).await {
            Ok(true) => {}
            Ok(false) => return SlotResponse::ok(Any::Null),
            Err(err) => return SlotResponse::err(err),
        }

        let mut resp = if self.config.circuit_breaker_enabled {
            let command = format!("{}:{}:{}", api_name, caller.client_ip, caller.user);
            self.dispatch_with_breaker(&command, &api.endpoint.service, &api.endpoint.slot, params).await
        } else {
            self.router.request_service(&api.endpoint.service, &api.endpoint.slot, params).await
        };

        let mut result = resp.data.clone();
        let mut err = resp.error.clone();
        run_out_chain(&self.middlewares, seq, version, api_name, &mut result, &mut err).await;
        resp.data = result;
        resp.error = err;

        if let (Some(translator), Some(lang), Some(error)) = (&self.translator, &caller.lang, &mut resp.error) {
            error.desc = translator.translate(lang, &error.desc);
        }

        resp
    }

    async fn dispatch_with_breaker(&self, command: &str, service: &str, slot: &str, params: Map) -> SlotResponse {
        let breaker = self.breaker_for(command);
        match breaker.try_admit() {
            Admission::RejectOpen | Admission::RejectConcurrency => {
                return SlotResponse::err(sentinel::sys_busy("circuit open"));
            }
            Admission::Allow => {}
        }

        let call = self.router.request_service(service, slot, params);
        match tokio::time::timeout(self.config.breaker.timeout, call).await {
            Ok(resp) => {
                if resp.is_ok() {
                    breaker.record_success();
                } else {
                    breaker.record_failure();
                }
                resp
            }
            Err(_) => {
                breaker.record_failure();
                SlotResponse::err(sentinel::sys_busy("request timed out"))
            }
        }
    }
}

#[allow(dead_code)]
fn _assert_duration_used(_: Duration) {}

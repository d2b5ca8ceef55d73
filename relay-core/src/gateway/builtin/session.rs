//! Session middleware (§4.4.2): verifies the caller against a configured
//! session service before letting the request through, unless the
//! `(version, api)` pair is whitelisted.

use std::sync::Arc;

use serde_json::Value;

use crate::error::RelayError;
use crate::gateway::middleware::{InOutcome, Middleware, MiddlewareType};
use crate::router::Router;
use crate::types::{Any, Map};

/// A single `version:api1,api2,*` whitelist entry.
#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub version: String,
    /// `None` means every API in `version` is whitelisted (the `*` entry).
    pub apis: Option<Vec<String>>,
}

pub fn parse_whitelist(spec: &str) -> Vec<WhitelistEntry> {
    spec.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let (version, apis) = entry.split_once(':')?;
            let apis = apis.split(',').map(str::trim).filter(|a| !a.is_empty()).collect::<Vec<_>>();
            let apis = if apis.iter().any(|a| *a == "*") { None } else { Some(apis.into_iter().map(String::from).collect()) };
            Some(WhitelistEntry { version: version.trim().to_string(), apis })
        })
        .collect()
}

fn is_whitelisted(whitelist: &[WhitelistEntry], version: &str, api: &str) -> bool {
    whitelist.iter().any(|entry| {
        entry.version == version
            && match &entry.apis {
                None => true,
                Some(apis) => apis.iter().any(|a| a == api),
            }
    })
}

/// The remapping of connector-supplied fields onto session-service parameter
/// names, per §4.4.2.
#[derive(Debug, Clone)]
pub struct SessionFieldMap {
    pub in_user_field: String,
    pub in_token_field: String,
    pub in_agent_field: String,
    pub in_address_field: String,
}

pub struct SessionMiddleware {
    router: Arc<dyn Router>,
    service: String,
    slot: String,
    fields: SessionFieldMap,
    whitelist: Vec<WhitelistEntry>,
}

impl SessionMiddleware {
    pub fn new(router: Arc<dyn Router>, service: impl Into<String>, slot: impl Into<String>, fields: SessionFieldMap, whitelist_spec: &str) -> Self {
        SessionMiddleware {
            router,
            service: service.into(),
            slot: slot.into(),
            fields,
            whitelist: parse_whitelist(whitelist_spec),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for SessionMiddleware {
    fn name(&self) -> &str {
        "session"
    }

    fn kind(&self) -> MiddlewareType {
        MiddlewareType::In
    }

    async fn handle_in(&self, _seq: u64, version: &str, api: &str, params: &mut Map) -> Result<InOutcome, RelayError> {
        if is_whitelisted(&self.whitelist, version, api) {
            return Ok(InOutcome::Continue);
        }

        let mut verify_params = Map::new();
        for (dst, src) in [
            ("User", &self.fields.in_user_field),
            ("Token", &self.fields.in_token_field),
            ("Agent", &self.fields.in_agent_field),
            ("Address", &self.fields.in_address_field),
        ] {
            if let Some(v) = params.get(src) {
                verify_params.insert(dst.to_string(), v.clone());
            }
        }

        let resp = self.router.request_service(&self.service, &self.slot, verify_params).await;
        match resp.error {
            Some(err) => Err(err),
            None => {
                if let Value::Object(extra) = resp.data {
                    for (k, v) in extra {
                        params.insert(k, v);
                    }
                }
                Ok(InOutcome::Continue)
            }
        }
    }
}

#[allow(dead_code)]
fn _assert_any(_: Any) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_star_matches_every_api_in_version() {
        let wl = parse_whitelist("v1:*");
        assert!(is_whitelisted(&wl, "v1", "AnythingGoes"));
        assert!(!is_whitelisted(&wl, "v2", "AnythingGoes"));
    }

    #[test]
    fn whitelist_named_entries_match_exactly() {
        let wl = parse_whitelist("v1:Login,Ping");
        assert!(is_whitelisted(&wl, "v1", "Login"));
        assert!(!is_whitelisted(&wl, "v1", "Other"));
    }
}

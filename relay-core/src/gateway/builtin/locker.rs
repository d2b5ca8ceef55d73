//! Locker middleware (§4.4.2): locks out a caller after too many failed
//! attempts against guarded APIs, tracked in a cache bucket and correlated
//! across the IN/OUT phases via `seq`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use relay_cache::CacheStore;

use crate::error::{sentinel, RelayError};
use crate::gateway::middleware::{InOutcome, Middleware, MiddlewareType};
use crate::types::{Any, Map};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Only the listed `(version, api)` pairs are guarded.
    Whitelist,
    /// Every API is guarded except the listed pairs.
    Blacklist,
}

pub struct LockerMiddleware {
    cache: Arc<dyn CacheStore>,
    bucket: String,
    max_fails: u32,
    lock_window: Duration,
    mode: GuardMode,
    guarded: Vec<(String, String)>,
    in_user_field: String,
    in_address_field: String,
    /// `seq -> caller key` for the in-flight request, set by `handle_in` and
    /// consumed by `handle_out`.
    pending: DashMap<u64, String>,
}

impl LockerMiddleware {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        bucket: impl Into<String>,
        max_fails: u32,
        lock_window: Duration,
        mode: GuardMode,
        guarded: Vec<(String, String)>,
        in_user_field: impl Into<String>,
        in_address_field: impl Into<String>,
    ) -> Self {
        LockerMiddleware {
            cache,
            bucket: bucket.into(),
            max_fails,
            lock_window,
            mode,
            guarded,
            in_user_field: in_user_field.into(),
            in_address_field: in_address_field.into(),
            pending: DashMap::new(),
        }
    }

    fn is_guarded(&self, version: &str, api: &str) -> bool {
        let listed = self.guarded.iter().any(|(v, a)| v == version && a == api);
        match self.mode {
            GuardMode::Whitelist => listed,
            GuardMode::Blacklist => !listed,
        }
    }

    fn cache_key(&self, caller: &str) -> String {
        format!("{}:{}", self.bucket, caller)
    }

    fn caller_key(&self, params: &Map) -> String {
        params
            .get(&self.in_user_field)
            .and_then(|v| v.as_str())
            .or_else(|| params.get(&self.in_address_field).and_then(|v| v.as_str()))
            .unwrap_or("unknown")
            .to_string()
    }
}

#[async_trait::async_trait]
impl Middleware for LockerMiddleware {
    fn name(&self) -> &str {
        "locker"
    }

    fn kind(&self) -> MiddlewareType {
        MiddlewareType::InOut
    }

    async fn handle_in(&self, seq: u64, version: &str, api: &str, params: &mut Map) -> Result<InOutcome, RelayError> {
        if !self.is_guarded(version, api) {
            return Ok(InOutcome::Continue);
        }

        let caller = self.caller_key(params);
        let key = self.cache_key(&caller);

        if let Some(bytes) = self.cache.get(&key).await {
            let fails: u32 = std::str::from_utf8(&bytes).ok().and_then(|s| s.parse().ok()).unwrap_or(0);
            if fails >= self.max_fails {
                return Err(sentinel::caller_unauthorized_access(format!("{caller} is locked out")));
            }
        }

        self.pending.insert(seq, caller);
        Ok(InOutcome::Continue)
    }

    async fn handle_out(&self, seq: u64, _version: &str, _api: &str, _result: &mut Any, err: &mut Option<RelayError>) {
        let Some((_, caller)) = self.pending.remove(&seq) else {
            return;
        };
        let key = self.cache_key(&caller);

        if err.is_some() {
            let current = self
                .cache
                .get(&key)
                .await
                .and_then(|b| std::str::from_utf8(&b).ok().and_then(|s| s.parse::<u32>().ok()))
                .unwrap_or(0);
            self.cache.set(&key, Bytes::from((current + 1).to_string()), self.lock_window).await;
        } else {
            self.cache.remove(&key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_cache::InMemoryStore;
    use serde_json::Value;

    fn middleware(max_fails: u32) -> LockerMiddleware {
        LockerMiddleware::new(
            Arc::new(InMemoryStore::new()),
            "login-fails",
            max_fails,
            Duration::from_secs(60),
            GuardMode::Whitelist,
            vec![("v1".to_string(), "Login".to_string())],
            "User",
            "Address",
        )
    }

    #[tokio::test]
    async fn unguarded_api_is_never_locked() {
        let mw = middleware(1);
        let mut params = Map::new();
        params.insert("User".to_string(), Value::from("alice"));
        let outcome = mw.handle_in(1, "v1", "Other", &mut params).await.unwrap();
        assert!(matches!(outcome, InOutcome::Continue));
    }

    #[tokio::test]
    async fn locks_out_after_max_fails() {
        let mw = middleware(2);
        for seq in 0..2u64 {
            let mut params = Map::new();
            params.insert("User".to_string(), Value::from("alice"));
            mw.handle_in(seq, "v1", "Login", &mut params).await.unwrap();
            let mut result = Any::Null;
            let mut err = Some(sentinel::caller_unauthorized_access("bad password"));
            mw.handle_out(seq, "v1", "Login", &mut result, &mut err).await;
        }

        let mut params = Map::new();
        params.insert("User".to_string(), Value::from("alice"));
        let err = mw.handle_in(2, "v1", "Login", &mut params).await.unwrap_err();
        assert_eq!(err.code, crate::error::Code::CallerUnauthorizedAccess);
    }

    #[tokio::test]
    async fn success_resets_the_failure_count() {
        let mw = middleware(2);
        let mut params = Map::new();
        params.insert("User".to_string(), Value::from("bob"));
        mw.handle_in(0, "v1", "Login", &mut params).await.unwrap();
        let mut result = Any::Null;
        let mut err = Some(sentinel::caller_unauthorized_access("bad password"));
        mw.handle_out(0, "v1", "Login", &mut result, &mut err).await;

        let mut params = Map::new();
        params.insert("User".to_string(), Value::from("bob"));
        mw.handle_in(1, "v1", "Login", &mut params).await.unwrap();
        let mut result = Any::Null;
        let mut err = None;
        mw.handle_out(1, "v1", "Login", &mut result, &mut err).await;

        let mut params = Map::new();
        params.insert("User".to_string(), Value::from("bob"));
        let outcome = mw.handle_in(2, "v1", "Login", &mut params).await.unwrap();
        assert!(matches!(outcome, InOutcome::Continue));
    }
}

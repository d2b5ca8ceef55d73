//! The middleware chain (§4.4.1): `IN` / `OUT` / `IN_OUT` hooks wrapped
//! around the router dispatch, correlated by a per-request `seq`.

use crate::error::RelayError;
use crate::types::{Any, Map};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareType {
    In,
    Out,
    InOut,
}

/// Outcome of an IN hook: `stop` ends the IN phase early (without an error,
/// e.g. the session middleware short-circuiting a cached auth decision);
/// `Err` aborts the request entirely.
pub enum InOutcome {
    Continue,
    Stop,
}

#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> MiddlewareType;

    /// Runs for `In`/`InOut` middlewares, in registration order, before the
    /// router dispatch.
    async fn handle_in(&self, _seq: u64, _version: &str, _api: &str, _params: &mut Map) -> Result<InOutcome, RelayError> {
        Ok(InOutcome::Continue)
    }

    /// Runs for `Out`/`InOut` middlewares, in registration order, after the
    /// router dispatch. May replace the handler's result.
    async fn handle_out(&self, _seq: u64, _version: &str, _api: &str, result: &mut Any, _err: &mut Option<RelayError>) {
        let _ = result;
    }
}

/// Runs the IN phase of the chain. Returns `Err` if an earlier stage
/// aborted with an error, or `Ok(false)` if a stage requested `stop`
/// (ending the IN phase without aborting the whole request).
pub async fn run_in_chain(
    chain: &[Box<dyn Middleware>],
    seq: u64,
    version: &str,
    api: &str,
    params: &mut Map,
) -> Result<bool, RelayError> {
    for mw in chain {
        if matches!(mw.kind(), MiddlewareType::In | MiddlewareType::InOut) {
            match mw.handle_in(seq, version, api, params).await? {
                InOutcome::Continue => {}
                InOutcome::Stop => return Ok(false),
            }
        }
    }
    Ok(true)
}

/// Runs the OUT phase of the chain, in registration order, unconditionally
/// (no `stop` semantics on the way out — every OUT hook observes the
/// result, possibly replacing it).
pub async fn run_out_chain(
    chain: &[Box<dyn Middleware>],
    seq: u64,
    version: &str,
    api: &str,
    result: &mut Any,
    err: &mut Option<RelayError>,
) {
    for mw in chain {
        if matches!(mw.kind(), MiddlewareType::Out | MiddlewareType::InOut) {
            mw.handle_out(seq, version, api, result, err).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        kind: MiddlewareType,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> MiddlewareType {
            self.kind
        }
        async fn handle_in(&self, _seq: u64, _v: &str, _a: &str, _p: &mut Map) -> Result<InOutcome, RelayError> {
            self.order.lock().unwrap().push(self.name);
            Ok(InOutcome::Continue)
        }
        async fn handle_out(&self, _seq: u64, _v: &str, _a: &str, _r: &mut Any, _e: &mut Option<RelayError>) {
            self.order.lock().unwrap().push(self.name);
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain: Vec<Box<dyn Middleware>> = vec![
            Box::new(Recorder { name: "m1", kind: MiddlewareType::In, order: order.clone() }),
            Box::new(Recorder { name: "m2", kind: MiddlewareType::In, order: order.clone() }),
            Box::new(Recorder { name: "m3", kind: MiddlewareType::Out, order: order.clone() }),
            Box::new(Recorder { name: "m4", kind: MiddlewareType::Out, order: order.clone() }),
        ];
        let mut params = Map::new();
        run_in_chain(&chain, 1, "v1", "hello", &mut params).await.unwrap();
        let mut result = Any::Null;
        let mut err = None;
        run_out_chain(&chain, 1, "v1", "hello", &mut result, &mut err).await;
        assert_eq!(*order.lock().unwrap(), vec!["m1", "m2", "m3", "m4"]);
    }

    struct Stopper;
    #[async_trait::async_trait]
    impl Middleware for Stopper {
        fn name(&self) -> &str {
            "stopper"
        }
        fn kind(&self) -> MiddlewareType {
            MiddlewareType::In
        }
        async fn handle_in(&self, _seq: u64, _v: &str, _a: &str, _p: &mut Map) -> Result<InOutcome, RelayError> {
            Ok(InOutcome::Stop)
        }
    }

    #[tokio::test]
    async fn stop_ends_the_in_phase() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let never_called = Arc::new(AtomicUsize::new(0));
        struct AfterStop(Arc<AtomicUsize>);
        #[async_trait::async_trait]
        impl Middleware for AfterStop {
            fn name(&self) -> &str {
                "after"
            }
            fn kind(&self) -> MiddlewareType {
                MiddlewareType::In
            }
            async fn handle_in(&self, _seq: u64, _v: &str, _a: &str, _p: &mut Map) -> Result<InOutcome, RelayError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(InOutcome::Continue)
            }
        }
        let chain: Vec<Box<dyn Middleware>> = vec![Box::new(Stopper), Box::new(AfterStop(never_called.clone()))];
        let mut params = Map::new();
        let continued = run_in_chain(&chain, 1, "v1", "hello", &mut params).await.unwrap();
        assert!(!continued);
        assert_eq!(never_called.load(Ordering::SeqCst), 0);
        let _ = &order;
    }
}

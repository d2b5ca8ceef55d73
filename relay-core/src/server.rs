//! Server (§4.3): owns the router, plugins, and service registry; a
//! signal-driven lifecycle around them.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;

use crate::entity::Eid;
use crate::error::{sentinel, RelayError};
use crate::router::Router;
use crate::types::Map;

/// A plugin opened alongside the server in declared order and closed in the
/// reverse order is not required (§4.3: "each close must be idempotent");
/// this trait only requires idempotent `close`.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    async fn open(&self) -> Result<(), RelayError>;
    async fn close(&self);
}

pub struct Server {
    router: Arc<dyn Router>,
    plugins: Vec<Arc<dyn Plugin>>,
    seq: AtomicU64,
    pid_file: PathBuf,
}

impl Server {
    pub fn new(router: Arc<dyn Router>) -> Self {
        Server { router, plugins: Vec::new(), seq: AtomicU64::new(0), pid_file: PathBuf::from("./pid.pid") }
    }

    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = path.into();
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn router(&self) -> Arc<dyn Router> {
        self.router.clone()
    }

    /// The next monotonically increasing request sequence number, threaded
    /// through the gateway's middleware chain.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Opens every plugin in declared order, writes the pid file, and
    /// returns once everything is ready to accept service registrations.
    pub async fn open(&self) -> Result<(), RelayError> {
        for plugin in &self.plugins {
            plugin.open().await.map_err(|e| sentinel::sys_internal(format!("plugin '{}' failed to open: {e}", plugin.name())))?;
        }
        std::fs::write(&self.pid_file, std::process::id().to_string())
            .map_err(|e| sentinel::sys_internal(format!("failed to write pid file: {e}")))?;
        Ok(())
    }

    /// Closes every plugin; failures are logged, not propagated, since
    /// shutdown must make forward progress regardless.
    pub async fn close(&self) {
        for plugin in &self.plugins {
            plugin.close().await;
        }
        let _ = std::fs::remove_file(&self.pid_file);
    }

    pub fn manage_entity(&self, eid: Eid, action: &str, params: &Map) -> Result<Value, RelayError> {
        self.router.manage_entity(eid, action, params)
    }

    /// Runs `self` until a shutdown signal (`SIGINT`, `SIGTERM`, or
    /// `SIGQUIT`; `SIGKILL` cannot be caught and is not listened for) is
    /// received, then closes plugins and returns.
    pub async fn run_until_shutdown(&self) {
        self.open().await.expect("server failed to open");
        wait_for_shutdown_signal().await;
        self.close().await;
    }

    /// Invokes `f` with panic isolation: outside debug mode, a handler panic
    /// is caught and converted into a structured *SysInternal* error rather
    /// than unwinding the caller's task.
    pub fn isolate<T>(debug: bool, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> Result<T, RelayError> {
        if debug {
            return Ok(f());
        }
        std::panic::catch_unwind(f).map_err(|_| sentinel::sys_unhandled("handler panicked"))
    }

    /// Async counterpart to [`Server::isolate`]: `std::panic::catch_unwind`
    /// only isolates a synchronous call, so a handler that panics after an
    /// `.await` point would still unwind the task underneath it. This wraps
    /// the polled future itself via `FutureExt::catch_unwind` instead, used
    /// by the router's dispatch path (§4.3, §7).
    pub async fn isolate_future<F: std::future::Future>(debug: bool, fut: F) -> Result<F::Output, RelayError> {
        if debug {
            return Ok(fut.await);
        }
        AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .map_err(|_| sentinel::sys_unhandled("handler panicked"))
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for Ctrl-C");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
        let mut quit = signal(SignalKind::quit()).expect("failed to listen for SIGQUIT");
        tokio::select! {
            _ = term.recv() => {},
            _ = quit.recv() => {},
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::LocalRouter;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

    struct CountingPlugin {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }
        async fn open(&self) -> Result<(), RelayError> {
            self.opens.fetch_add(1, StdOrdering::SeqCst);
            Ok(())
        }
        async fn close(&self) {
            self.closes.fetch_add(1, StdOrdering::SeqCst);
        }
    }

    #[tokio::test]
    async fn open_and_close_drive_every_plugin() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let dir = tempfile::tempdir().unwrap();
        let server = Server::new(Arc::new(LocalRouter::new()) as Arc<dyn Router>)
            .with_pid_file(dir.path().join("pid.pid"))
            .with_plugin(Arc::new(CountingPlugin { opens: opens.clone(), closes: closes.clone() }));

        server.open().await.unwrap();
        assert!(dir.path().join("pid.pid").exists());
        assert_eq!(opens.load(StdOrdering::SeqCst), 1);

        server.close().await;
        assert_eq!(closes.load(StdOrdering::SeqCst), 1);
        assert!(!dir.path().join("pid.pid").exists());
    }

    #[test]
    fn seq_is_monotonically_increasing() {
        let server = Server::new(Arc::new(LocalRouter::new()) as Arc<dyn Router>);
        let a = server.next_seq();
        let b = server.next_seq();
        assert!(b > a);
    }

    #[test]
    fn isolate_converts_panics_to_sys_unhandled() {
        let err = Server::isolate(false, || -> () { panic!("boom") }).unwrap_err();
        assert_eq!(err.code, crate::error::Code::SysUnhandled);
    }

    #[test]
    fn isolate_lets_panics_through_in_debug_mode() {
        let result = std::panic::catch_unwind(|| Server::isolate(true, || 1 + 1));
        assert_eq!(result.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn isolate_future_converts_panics_across_an_await_point() {
        let err = Server::isolate_future(false, async {
            tokio::task::yield_now().await;
            panic!("boom");
        })
        .await
        .unwrap_err();
        assert_eq!(err.code, crate::error::Code::SysUnhandled);
    }

    #[tokio::test]
    async fn isolate_future_lets_successful_futures_through() {
        let ok = Server::isolate_future(false, async { 1 + 1 }).await.unwrap();
        assert_eq!(ok, 2);
    }
}

//! OpenTelemetry observability plugin for the relay dispatch kernel.
//!
//! Provides distributed tracing via OpenTelemetry, context propagation, and
//! a Tower middleware layer (`OtelTraceLayer`) callers can attach to the
//! `axum::Router` a [`relay_core::connector::Connector`] produces.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relay_core::server::Server;
//! use relay_observability::{Observability, ObservabilityConfig};
//! use std::sync::Arc;
//!
//! let server = Server::new(router)
//!     .with_plugin(Arc::new(Observability::new(
//!         ObservabilityConfig::new("my-service")
//!             .with_service_version("1.0.0")
//!             .with_endpoint("http://otel-collector:4317")
//!             .capture_header("x-tenant-id"),
//!     )));
//! ```

pub mod config;
pub mod middleware;
pub mod propagation;
pub mod tracing_setup;

pub use config::{LogFormat, ObservabilityConfig, OtlpProtocol, PropagationFormat};
pub use middleware::OtelTraceLayer;
pub use tracing_setup::OtelGuard;

use std::sync::Mutex;

use relay_core::error::RelayError;
use relay_core::server::Plugin;

/// Full-stack observability plugin: installs the global trace-context
/// propagator and an OpenTelemetry-backed `tracing-subscriber` stack on
/// open, flushing pending traces on close.
pub struct Observability {
    config: ObservabilityConfig,
    guard: Mutex<Option<OtelGuard>>,
}

impl Observability {
    pub fn new(config: ObservabilityConfig) -> Self {
        Self { config, guard: Mutex::new(None) }
    }
}

#[async_trait::async_trait]
impl Plugin for Observability {
    fn name(&self) -> &str {
        "observability"
    }

    async fn open(&self) -> Result<(), RelayError> {
        propagation::install_propagator(&self.config);
        if self.config.tracing_enabled {
            let guard = tracing_setup::init_tracing(&self.config);
            *self.guard.lock().expect("observability guard mutex poisoned") = Some(guard);
        }
        Ok(())
    }

    async fn close(&self) {
        self.guard.lock().expect("observability guard mutex poisoned").take();
        tracing::info!("OpenTelemetry traces flushed");
    }
}

//! Connectors (§4.6): translate an external protocol into a `gateway.request_api`
//! call and encode the result back onto the wire.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::Router as AxumRouter;

use crate::gateway::Gateway;

/// Mounts a connector's routes onto an axum app, given the gateway it
/// forwards to.
pub trait Connector: Send + Sync {
    fn app(&self, gateway: Arc<Gateway>) -> AxumRouter;
}

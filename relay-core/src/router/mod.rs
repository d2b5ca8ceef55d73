//! The router contract (§4.2): resolves `(service, slot)` to a local
//! service and invokes it, or — in the remote variant — dispatches via RPC
//! to a peer discovered through a shared store.

pub mod discovery;
pub mod local;
pub mod remote;

use std::sync::Arc;

use serde_json::Value;

use crate::entity::{Eid, EntityIndex};
use crate::error::RelayError;
use crate::service::Service;
use crate::types::{Map, SlotResponse};

pub use local::LocalRouter;
pub use remote::RemoteRouter;

/// Implemented by both the local and the discovery-backed remote router.
#[async_trait::async_trait]
pub trait Router: Send + Sync {
    /// Fails with `SysInternal` if the service name is already registered.
    async fn register_service(&self, service: Arc<dyn Service>) -> Result<(), RelayError>;

    fn unregister_service(&self, name: &str);

    async fn request_service(&self, service: &str, slot: &str, params: Map) -> SlotResponse;

    fn register_entity(&self, eid: Eid);

    fn entity_index(&self) -> &EntityIndex;

    /// Looks up the entity registered for `eid` and delegates `action` to
    /// its stub, handing it the entity's config (§4.2, §4.1). The default
    /// here only has `EntityIndex` membership to go on, so a known-but-
    /// unreachable entity fails with `SysInternal` rather than silently
    /// succeeding; `LocalRouter` overrides this with a real lookup.
    fn manage_entity(&self, eid: Eid, _action: &str, _params: &Map) -> Result<Value, RelayError> {
        if self.entity_index().contains(&eid) {
            Err(crate::error::sentinel::sys_internal("entity has no management handler"))
        } else {
            Err(crate::error::sentinel::caller_invalid_request("unknown entity"))
        }
    }
}

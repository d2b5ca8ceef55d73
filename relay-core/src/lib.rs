pub mod config;
pub mod connector;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod packer;
pub mod router;
pub mod server;
pub mod service;
pub mod types;

pub mod prelude {
    pub use crate::config::RelayConfig;
    pub use crate::connector::{http::HttpConnector, http::HttpConnectorConfig, Connector};
    pub use crate::entity::{Entity, EntityConfig, EntityMeta, EntityStub, EntityType, Eid};
    pub use crate::error::{sentinel, Code, RelayError};
    pub use crate::gateway::{Api, ApiDescriptor, CallerContext, EndPoint, Gateway, GatewayConfig};
    pub use crate::packer::{DataPacker, JsonPacker};
    pub use crate::router::{LocalRouter, RemoteRouter, Router};
    pub use crate::server::{Plugin, Server};
    pub use crate::service::{Service, SemanticType, SlotParameter, SlotRequest};
    pub use crate::types::{Any, Map, SlotResponse};
}

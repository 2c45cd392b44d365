//! Thin adapters for the control plane's external collaborators
//!
//! - Mesh client: gRPC connection to a mesh adapter (`meshes.MeshService`)
//! - Broker: subscription delivering synced objects (NATS)
//! - Store: insert-only persistence of synced objects (SQLite)

pub mod broker;
pub mod mesh_client;
pub mod proto;
pub mod store;

pub use broker::{BrokerError, BrokerMessage, BrokerSubscription, ChannelSubscription, NatsSubscription};
pub use mesh_client::{
    AdapterClientError, AdapterClientResult, AdapterConnector, GrpcAdapterConnector,
    MeshAdapterClient,
};
pub use store::{ObjectStore, SqlObjectStore, StoreError, StoreResult};

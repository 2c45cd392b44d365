//! Core domain types for the mesh control plane
//!
//! This crate holds the data model shared by the service and API layers:
//!
//! - [`Adapter`]: a registered mesh adapter and its capability metadata
//! - [`OperationRequest`]: one operation dispatched to an adapter
//! - [`SyncedObject`]: an infrastructure object observed by the sync pipeline
//! - [`ControllerStatus`]: health of a background controller
//! - [`ClusterContext`]: source of per-cluster credentials

pub mod adapter;
pub mod cluster;
pub mod operation;
pub mod status;
pub mod synced;

pub use adapter::{Adapter, AvailableAdapter, ComponentInfo};
pub use cluster::{ClusterContext, CredentialError, StaticClusterContext};
pub use operation::{
    namespace_or_default, CallerIdentity, OperationId, OperationRequest, DEFAULT_NAMESPACE,
};
pub use status::{ControllerError, ControllerStatus, Status};
pub use synced::{DecodeError, ObjectMeta, SyncEnvelope, SyncedObject};

//! Mesh control plane services
//!
//! This crate implements the control plane's moving parts:
//!
//! - [`AdapterRegistry`]: registration, removal and lookup of mesh adapters,
//!   with one availability prober per adapter
//! - [`OperationDispatcher`]: routes an operation to its adapter with the
//!   caller's cluster credentials attached
//! - [`IngestionPipeline`]: drains synced objects from the broker into storage
//! - [`StatusReporter`]: point-in-time and streaming pipeline status
//!
//! External collaborators (adapter RPC, broker, storage) live under
//! [`adapters`] behind traits. [`ControlPlane`] wires everything together.

pub mod adapters;
pub mod config;
pub mod contexts;
pub mod dispatcher;
pub mod ingest;
pub mod ports;
pub mod prober;
pub mod registry;
pub mod retry;
pub mod status;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{
    ClusterSettings, ConfigError, ControlPlaneConfig, FailurePolicy, IngestionSettings,
    RegistrySettings, RetrySettings,
};
pub use contexts::{ClusterContextProvider, ConfiguredContexts, FileClusterContext};
pub use dispatcher::{DispatchError, DispatchReceipt, DispatchRequest, DispatchResult, OperationDispatcher};
pub use ingest::{IngestError, IngestResult, IngestionHealth, IngestionPipeline, PipelineState};
pub use ports::{PortAllocator, PortAllocatorError};
pub use prober::{EndpointProbe, ProbeHandle, TcpProbe};
pub use registry::{AdapterRegistry, RegistryError, RegistryResult};
pub use retry::{retry_with_backoff, RetryConfig};
pub use status::StatusReporter;

use mesh_control_core::AvailableAdapter;
use std::sync::Arc;

use adapters::{AdapterConnector, BrokerSubscription, ObjectStore};

/// Collaborators the control plane is built from
pub struct ControlPlaneDeps {
    pub connector: Arc<dyn AdapterConnector>,
    pub probe: Arc<dyn EndpointProbe>,
    pub store: Arc<dyn ObjectStore>,
    pub subscription: Box<dyn BrokerSubscription>,
    pub contexts: Arc<dyn ClusterContextProvider>,
}

/// Container for all control plane services
pub struct ControlPlane {
    registry: Arc<AdapterRegistry>,
    dispatcher: OperationDispatcher,
    status: StatusReporter,
    contexts: Arc<dyn ClusterContextProvider>,
    catalogue: Vec<AvailableAdapter>,
}

impl ControlPlane {
    /// Build the control plane. The ingestion pipeline is not started.
    pub fn new(config: &ControlPlaneConfig, deps: ControlPlaneDeps) -> Self {
        let ControlPlaneDeps {
            connector,
            probe,
            store,
            subscription,
            contexts,
        } = deps;

        let registry = Arc::new(AdapterRegistry::new(
            connector.clone(),
            probe,
            config.registry.clone(),
        ));
        Self::assemble(config, registry, connector, store, subscription, contexts)
    }

    /// Build the control plane around an existing registry.
    pub fn with_registry(
        config: &ControlPlaneConfig,
        registry: Arc<AdapterRegistry>,
        deps: ControlPlaneDeps,
    ) -> Self {
        Self::assemble(
            config,
            registry,
            deps.connector,
            deps.store,
            deps.subscription,
            deps.contexts,
        )
    }

    fn assemble(
        config: &ControlPlaneConfig,
        registry: Arc<AdapterRegistry>,
        connector: Arc<dyn AdapterConnector>,
        store: Arc<dyn ObjectStore>,
        subscription: Box<dyn BrokerSubscription>,
        contexts: Arc<dyn ClusterContextProvider>,
    ) -> Self {
        let dispatcher =
            OperationDispatcher::new(registry.clone(), connector, config.registry.rpc_timeout());
        let pipeline = Arc::new(IngestionPipeline::new(store, &config.ingestion));
        let status = StatusReporter::new(&config.ingestion.controller_name, pipeline, subscription);

        Self {
            registry,
            dispatcher,
            status,
            contexts,
            catalogue: config.available_adapters.clone(),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &OperationDispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn contexts(&self) -> &dyn ClusterContextProvider {
        self.contexts.as_ref()
    }

    /// Known adapter locations offered to callers
    pub fn catalogue(&self) -> &[AvailableAdapter] {
        &self.catalogue
    }

    /// Stop the ingestion pipeline and every prober.
    pub async fn shutdown(&self) {
        self.status.shutdown().await;
        self.registry.shutdown().await;
    }
}

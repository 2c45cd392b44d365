//! Shared harness for the workspace's end-to-end tests
//!
//! [`RecordingConnector`] stands in for a fleet of adapters and records every
//! `ApplyOperation` it receives; [`StaticProbe`] answers reachability checks
//! from a flag. [`Harness`] builds a full [`ControlPlane`] around them.

use async_trait::async_trait;
use mesh_control_core::{ClusterContext, ComponentInfo, OperationRequest, StaticClusterContext};
use mesh_control_service::adapters::{
    AdapterClientError, AdapterClientResult, AdapterConnector, BrokerMessage, ChannelSubscription,
    MeshAdapterClient, SqlObjectStore,
};
use mesh_control_service::{
    AdapterRegistry, ConfiguredContexts, ControlPlane, ControlPlaneConfig, ControlPlaneDeps,
    EndpointProbe, PortAllocator,
};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One `ApplyOperation` call as received by an adapter
#[derive(Debug, Clone)]
pub struct RecordedOperation {
    pub host: String,
    pub operation_id: String,
    pub op_name: String,
    pub username: String,
    pub namespace: String,
    pub delete_op: bool,
    pub kube_configs: Vec<String>,
}

#[derive(Debug, Clone)]
struct ServedAdapter {
    version: String,
    ops: BTreeSet<String>,
}

/// Connector backed by in-process adapters
#[derive(Default)]
pub struct RecordingConnector {
    adapters: Mutex<HashMap<String, ServedAdapter>>,
    metadata_calls: Arc<AtomicUsize>,
    operations: Arc<Mutex<Vec<RecordedOperation>>>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bring an adapter up at `host`.
    pub fn serve(&self, host: &str, version: &str, ops: &[&str]) {
        self.adapters.lock().unwrap().insert(
            host.to_string(),
            ServedAdapter {
                version: version.to_string(),
                ops: ops.iter().map(|op| op.to_string()).collect(),
            },
        );
    }

    /// Number of `SupportedOperations` and `ComponentInfo` calls served
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn operations(&self) -> Vec<RecordedOperation> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterConnector for RecordingConnector {
    async fn connect(&self, host: &str) -> AdapterClientResult<Box<dyn MeshAdapterClient>> {
        let served = self
            .adapters
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .ok_or_else(|| AdapterClientError::Transport(format!("{} refused connection", host)))?;

        Ok(Box::new(RecordingClient {
            host: host.to_string(),
            served,
            metadata_calls: self.metadata_calls.clone(),
            operations: self.operations.clone(),
        }))
    }
}

struct RecordingClient {
    host: String,
    served: ServedAdapter,
    metadata_calls: Arc<AtomicUsize>,
    operations: Arc<Mutex<Vec<RecordedOperation>>>,
}

#[async_trait]
impl MeshAdapterClient for RecordingClient {
    async fn supported_operations(&self) -> AdapterClientResult<BTreeSet<String>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.served.ops.clone())
    }

    async fn component_info(&self) -> AdapterClientResult<ComponentInfo> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ComponentInfo {
            name: format!("adapter@{}", self.host),
            version: self.served.version.clone(),
            git_commit_sha: "0000000".to_string(),
        })
    }

    async fn apply_operation(&self, request: OperationRequest) -> AdapterClientResult<()> {
        self.operations.lock().unwrap().push(RecordedOperation {
            host: self.host.clone(),
            operation_id: request.operation_id.to_string(),
            op_name: request.op_name,
            username: request.username,
            namespace: request.namespace,
            delete_op: request.delete_op,
            kube_configs: request
                .kube_configs
                .iter()
                .map(|kc| kc.expose_secret().clone())
                .collect(),
        });
        Ok(())
    }
}

/// Probe answering from a shared flag
#[derive(Default)]
pub struct StaticProbe {
    reachable: AtomicBool,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(reachable),
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EndpointProbe for StaticProbe {
    async fn probe(&self, _host: &str) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Static cluster context with a recognisable kubeconfig
pub fn cluster(name: &str) -> Arc<dyn ClusterContext> {
    Arc::new(StaticClusterContext::new(
        name,
        SecretString::new(format!("kubeconfig for {}", name)),
    ))
}

/// A control plane wired to in-process collaborators
pub struct Harness {
    pub plane: Arc<ControlPlane>,
    pub connector: Arc<RecordingConnector>,
    pub probe: Arc<StaticProbe>,
    pub store: Arc<SqlObjectStore>,
    pub broker: mpsc::Sender<BrokerMessage>,
}

impl Harness {
    /// Build a control plane offering `clusters` to every caller.
    pub async fn new(config: ControlPlaneConfig, clusters: Vec<Arc<dyn ClusterContext>>) -> Self {
        let connector = RecordingConnector::new();
        let probe = StaticProbe::new(true);
        let store = Arc::new(
            SqlObjectStore::in_memory()
                .await
                .expect("in-memory store"),
        );
        let (broker, subscription) = ChannelSubscription::channel(64);

        let registry = Arc::new(AdapterRegistry::with_ports(
            connector.clone(),
            probe.clone(),
            config.registry.clone(),
            PortAllocator::without_host_check(config.registry.port_range_start..=config.registry.port_range_end),
        ));

        let plane = ControlPlane::with_registry(
            &config,
            registry,
            ControlPlaneDeps {
                connector: connector.clone(),
                probe: probe.clone(),
                store: store.clone(),
                subscription: Box::new(subscription),
                contexts: Arc::new(ConfiguredContexts::new(clusters)),
            },
        );

        Self {
            plane: Arc::new(plane),
            connector,
            probe,
            store,
            broker,
        }
    }

    /// Publish a synced object the way the sync controller does.
    pub async fn publish(&self, kind: &str, name: &str) {
        let payload = serde_json::json!({
            "eventType": "ADDED",
            "object": {
                "kind": kind,
                "apiVersion": "v1",
                "metadata": { "name": name, "namespace": "default" }
            }
        });
        self.publish_raw(payload.to_string().into_bytes()).await;
    }

    pub async fn publish_raw(&self, payload: Vec<u8>) {
        self.broker
            .send(BrokerMessage::new("meshery.meshsync.core", payload))
            .await
            .expect("broker channel open");
    }
}

//! In-process fakes for the adapter connector and the endpoint probe

use async_trait::async_trait;
use mesh_control_core::{ComponentInfo, OperationRequest};
use secrecy::ExposeSecret;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapters::{AdapterClientError, AdapterClientResult, AdapterConnector, MeshAdapterClient};
use crate::prober::EndpointProbe;

/// An `ApplyOperation` call as seen by a fake adapter
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub host: String,
    pub operation_id: String,
    pub op_name: String,
    pub username: String,
    pub namespace: String,
    pub custom_body: String,
    pub delete_op: bool,
    pub kube_configs: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Behaviour {
    info: ComponentInfo,
    ops: BTreeSet<String>,
    fail_component_info: bool,
    metadata_delay: Option<Duration>,
    apply_error: Option<String>,
}

#[derive(Default)]
pub struct FakeConnector {
    adapters: Mutex<HashMap<String, Behaviour>>,
    connects: Mutex<HashMap<String, usize>>,
    applied: Arc<Mutex<Vec<AppliedOperation>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, host: &str, version: &str, ops: &[&str]) {
        let behaviour = Behaviour {
            info: ComponentInfo {
                name: format!("adapter-{}", host),
                version: version.to_string(),
                git_commit_sha: "0000000".to_string(),
            },
            ops: ops.iter().map(|op| op.to_string()).collect(),
            ..Default::default()
        };
        self.adapters.lock().unwrap().insert(host.to_string(), behaviour);
    }

    pub fn fail_component_info(&self, host: &str) {
        self.with(host, |b| b.fail_component_info = true);
    }

    pub fn delay_metadata(&self, host: &str, delay: Duration) {
        self.with(host, |b| b.metadata_delay = Some(delay));
    }

    pub fn fail_apply(&self, host: &str, message: &str) {
        let message = message.to_string();
        self.with(host, move |b| b.apply_error = Some(message));
    }

    pub fn connects(&self, host: &str) -> usize {
        self.connects.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn applied(&self) -> Vec<AppliedOperation> {
        self.applied.lock().unwrap().clone()
    }

    fn with(&self, host: &str, f: impl FnOnce(&mut Behaviour)) {
        let mut adapters = self.adapters.lock().unwrap();
        f(adapters.get_mut(host).expect("host not served"));
    }
}

#[async_trait]
impl AdapterConnector for FakeConnector {
    async fn connect(&self, host: &str) -> AdapterClientResult<Box<dyn MeshAdapterClient>> {
        *self.connects.lock().unwrap().entry(host.to_string()).or_default() += 1;

        let behaviour = self
            .adapters
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .ok_or_else(|| AdapterClientError::Transport("connection refused".to_string()))?;

        Ok(Box::new(FakeClient {
            host: host.to_string(),
            behaviour,
            applied: self.applied.clone(),
        }))
    }
}

struct FakeClient {
    host: String,
    behaviour: Behaviour,
    applied: Arc<Mutex<Vec<AppliedOperation>>>,
}

#[async_trait]
impl MeshAdapterClient for FakeClient {
    async fn supported_operations(&self) -> AdapterClientResult<BTreeSet<String>> {
        if let Some(delay) = self.behaviour.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.behaviour.ops.clone())
    }

    async fn component_info(&self) -> AdapterClientResult<ComponentInfo> {
        if self.behaviour.fail_component_info {
            return Err(AdapterClientError::Status {
                code: "Unavailable".to_string(),
                message: "component info unavailable".to_string(),
            });
        }
        Ok(self.behaviour.info.clone())
    }

    async fn apply_operation(&self, request: OperationRequest) -> AdapterClientResult<()> {
        self.applied.lock().unwrap().push(AppliedOperation {
            host: self.host.clone(),
            operation_id: request.operation_id.to_string(),
            op_name: request.op_name,
            username: request.username,
            namespace: request.namespace,
            custom_body: request.custom_body,
            delete_op: request.delete_op,
            kube_configs: request
                .kube_configs
                .iter()
                .map(|kc| kc.expose_secret().clone())
                .collect(),
        });

        match &self.behaviour.apply_error {
            Some(message) => Err(AdapterClientError::Adapter(message.clone())),
            None => Ok(()),
        }
    }
}

/// Probe whose answer is set by the test
pub struct FakeProbe {
    reachable: AtomicBool,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(reachable),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointProbe for FakeProbe {
    async fn probe(&self, _host: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

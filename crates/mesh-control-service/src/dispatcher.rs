//! Operation dispatch
//!
//! Turns a logical operation request into exactly one `ApplyOperation` call
//! on the resolved adapter, carrying a credential blob for every active
//! cluster context of the caller.

use mesh_control_core::{
    namespace_or_default, CallerIdentity, ClusterContext, CredentialError, OperationId,
    OperationRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AdapterClientError, AdapterConnector};
use crate::registry::AdapterRegistry;

/// Errors from dispatching an operation
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Adapter could not be found: {0}")]
    InvalidAdapter(String),
    #[error("No active cluster context for caller {0}")]
    InvalidClusterConfig(String),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("Unable to connect to adapter {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: AdapterClientError,
    },
    /// The adapter rejected the operation; the message is the adapter's own.
    #[error("{0}")]
    Remote(String),
    #[error("Adapter {host} did not accept operation within {}ms", .after.as_millis())]
    Timeout { host: String, after: Duration },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Caller-supplied part of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Adapter key, either `host` or `host:port`
    pub adapter: String,
    pub op_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub custom_body: String,
    #[serde(default)]
    pub delete_op: bool,
}

impl DispatchRequest {
    pub fn new(adapter: impl Into<String>, op_name: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            op_name: op_name.into(),
            namespace: None,
            custom_body: String::new(),
            delete_op: false,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_custom_body(mut self, body: impl Into<String>) -> Self {
        self.custom_body = body.into();
        self
    }

    pub fn with_delete(mut self, delete_op: bool) -> Self {
        self.delete_op = delete_op;
        self
    }
}

/// What the adapter accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    pub operation_id: OperationId,
    pub adapter_host: String,
    pub cluster_count: usize,
}

/// Routes operations to registered adapters
pub struct OperationDispatcher {
    registry: Arc<AdapterRegistry>,
    connector: Arc<dyn AdapterConnector>,
    rpc_timeout: Duration,
}

impl OperationDispatcher {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        connector: Arc<dyn AdapterConnector>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connector,
            rpc_timeout,
        }
    }

    /// Dispatch `request` on behalf of `caller` across `contexts`.
    ///
    /// Nothing is sent unless the adapter resolves, at least one context is
    /// present and every context produced its credentials. The call is made
    /// once and never retried.
    #[instrument(skip(self, request, contexts), fields(adapter = %request.adapter, op = %request.op_name, caller = %caller))]
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        caller: &CallerIdentity,
        contexts: &[Arc<dyn ClusterContext>],
    ) -> DispatchResult<DispatchReceipt> {
        let adapter = self
            .registry
            .resolve(&request.adapter)
            .await
            .map_err(|_| DispatchError::InvalidAdapter(request.adapter.clone()))?;

        if contexts.is_empty() {
            return Err(DispatchError::InvalidClusterConfig(caller.to_string()));
        }

        let kube_configs = contexts
            .iter()
            .map(|context| context.generate_kubeconfig())
            .collect::<Result<Vec<_>, _>>()?;

        let operation_id = OperationId::new();
        let operation = OperationRequest {
            operation_id,
            op_name: request.op_name,
            username: caller.as_str().to_string(),
            namespace: namespace_or_default(request.namespace.as_deref()),
            custom_body: request.custom_body,
            delete_op: request.delete_op,
            kube_configs,
        };

        debug!(
            operation_id = %operation_id,
            host = %adapter.host,
            clusters = contexts.len(),
            "Dispatching operation"
        );

        let host = adapter.host.clone();
        tokio::time::timeout(self.rpc_timeout, async {
            let client = self
                .connector
                .connect(&host)
                .await
                .map_err(|source| DispatchError::Connection {
                    host: host.clone(),
                    source,
                })?;
            client.apply_operation(operation).await.map_err(|e| {
                warn!(operation_id = %operation_id, error = %e, "Adapter rejected operation");
                match e {
                    AdapterClientError::Status { message, .. } => DispatchError::Remote(message),
                    AdapterClientError::Adapter(message) => DispatchError::Remote(message),
                    other => DispatchError::Remote(other.to_string()),
                }
            })
        })
        .await
        .map_err(|_| DispatchError::Timeout {
            host: host.clone(),
            after: self.rpc_timeout,
        })??;

        info!(operation_id = %operation_id, host = %host, "Operation accepted by adapter");

        Ok(DispatchReceipt {
            operation_id,
            adapter_host: host,
            cluster_count: contexts.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistrySettings;
    use crate::ports::PortAllocator;
    use crate::test_support::{FakeConnector, FakeProbe};
    use mesh_control_core::StaticClusterContext;
    use secrecy::SecretString;
    use std::collections::HashSet;

    async fn setup(hosts: &[&str]) -> (Arc<FakeConnector>, OperationDispatcher) {
        let connector = FakeConnector::new();
        for host in hosts {
            connector.serve(host, "v1", &["apply"]);
        }
        let registry = Arc::new(AdapterRegistry::with_ports(
            connector.clone(),
            FakeProbe::new(true),
            RegistrySettings::default(),
            PortAllocator::without_host_check(31_000..=31_099),
        ));
        for host in hosts {
            registry.add(host).await.unwrap();
        }
        let dispatcher = OperationDispatcher::new(registry, connector.clone(), Duration::from_secs(5));
        (connector, dispatcher)
    }

    fn context(name: &str) -> Arc<dyn ClusterContext> {
        Arc::new(StaticClusterContext::new(
            name,
            SecretString::new(format!("kubeconfig-{}", name)),
        ))
    }

    #[derive(Debug)]
    struct BrokenContext;

    impl ClusterContext for BrokenContext {
        fn name(&self) -> &str {
            "broken"
        }

        fn generate_kubeconfig(&self) -> Result<SecretString, CredentialError> {
            Err(CredentialError::generation("broken", "token expired"))
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_one_call_with_all_kubeconfigs() {
        let (connector, dispatcher) = setup(&["A:0"]).await;
        let caller = CallerIdentity::new("user-1");

        let receipt = dispatcher
            .dispatch(
                DispatchRequest::new("A:0", "apply").with_custom_body("{}"),
                &caller,
                &[context("east"), context("west")],
            )
            .await
            .unwrap();

        let applied = connector.applied();
        assert_eq!(applied.len(), 1);
        let call = &applied[0];
        assert_eq!(call.operation_id, receipt.operation_id.to_string());
        assert_eq!(call.op_name, "apply");
        assert_eq!(call.username, "user-1");
        assert_eq!(call.namespace, "default");
        assert_eq!(call.custom_body, "{}");
        assert!(!call.delete_op);
        assert_eq!(call.kube_configs, ["kubeconfig-east", "kubeconfig-west"]);
        assert_eq!(receipt.cluster_count, 2);
    }

    #[tokio::test]
    async fn test_unknown_adapter_makes_no_call() {
        let (connector, dispatcher) = setup(&["A:0"]).await;

        let err = dispatcher
            .dispatch(
                DispatchRequest::new("B:0", "apply"),
                &CallerIdentity::new("user-1"),
                &[context("east")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidAdapter(_)));
        assert!(connector.applied().is_empty());
    }

    #[tokio::test]
    async fn test_zero_contexts_makes_no_call() {
        let (connector, dispatcher) = setup(&["A:0"]).await;

        let err = dispatcher
            .dispatch(DispatchRequest::new("A:0", "apply"), &CallerIdentity::new("user-1"), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidClusterConfig(_)));
        assert!(connector.applied().is_empty());
    }

    #[tokio::test]
    async fn test_credential_failure_aborts_dispatch() {
        let (connector, dispatcher) = setup(&["A:0"]).await;
        let contexts: Vec<Arc<dyn ClusterContext>> = vec![context("east"), Arc::new(BrokenContext)];

        let err = dispatcher
            .dispatch(DispatchRequest::new("A:0", "apply"), &CallerIdentity::new("user-1"), &contexts)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Credentials(_)));
        assert!(connector.applied().is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_surfaced_verbatim() {
        let (connector, dispatcher) = setup(&["A:0"]).await;
        connector.fail_apply("A:0", "istio is already installed");

        let err = dispatcher
            .dispatch(
                DispatchRequest::new("A:0", "apply").with_delete(true),
                &CallerIdentity::new("user-1"),
                &[context("east")],
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "istio is already installed");
        assert_eq!(connector.applied().len(), 1);
        assert!(connector.applied()[0].delete_op);
    }

    #[tokio::test]
    async fn test_resolves_by_address_and_keeps_namespace() {
        let (connector, dispatcher) = setup(&["A:0"]).await;
        let address = dispatcher.registry.resolve("A:0").await.unwrap().address();

        dispatcher
            .dispatch(
                DispatchRequest::new(address, "apply").with_namespace("istio-system"),
                &CallerIdentity::new("user-1"),
                &[context("east")],
            )
            .await
            .unwrap();

        assert_eq!(connector.applied()[0].namespace, "istio-system");
        assert_eq!(connector.applied()[0].host, "A:0");
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_get_distinct_ids() {
        let (connector, dispatcher) = setup(&["A:0"]).await;
        let dispatcher = Arc::new(dispatcher);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher
                        .dispatch(
                            DispatchRequest::new("A:0", "apply"),
                            &CallerIdentity::new(format!("user-{}", i)),
                            &[context("east")],
                        )
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let ids: HashSet<_> = connector.applied().into_iter().map(|c| c.operation_id).collect();
        assert_eq!(ids.len(), 16);
    }
}

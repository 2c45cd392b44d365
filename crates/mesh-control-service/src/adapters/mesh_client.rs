//! Mesh adapter RPC client
//!
//! Thin adapter over the adapter's gRPC surface. The registry and dispatcher
//! only see the [`AdapterConnector`] and [`MeshAdapterClient`] traits so they
//! can be exercised without a live adapter.

use async_trait::async_trait;
use mesh_control_core::{ComponentInfo, OperationRequest};
use secrecy::ExposeSecret;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tonic::transport::Endpoint;
use tracing::{debug, instrument};

use super::proto::{
    ApplyRuleRequest, ComponentInfoRequest, MeshServiceClient, SupportedOperationsRequest,
};

/// Errors from talking to an adapter
#[derive(Error, Debug)]
pub enum AdapterClientError {
    #[error("Invalid adapter endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{code}: {message}")]
    Status { code: String, message: String },
    #[error("Adapter reported error: {0}")]
    Adapter(String),
}

impl From<tonic::Status> for AdapterClientError {
    fn from(status: tonic::Status) -> Self {
        Self::Status {
            code: format!("{:?}", status.code()),
            message: status.message().to_string(),
        }
    }
}

impl From<tonic::transport::Error> for AdapterClientError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for adapter client operations
pub type AdapterClientResult<T> = Result<T, AdapterClientError>;

/// The RPC surface consumed from a connected adapter
#[async_trait]
pub trait MeshAdapterClient: Send + Sync {
    /// Names of the operations the adapter supports
    async fn supported_operations(&self) -> AdapterClientResult<BTreeSet<String>>;

    /// Name, version and commit of the adapter build
    async fn component_info(&self) -> AdapterClientResult<ComponentInfo>;

    /// Hand an operation to the adapter. Success means "accepted".
    async fn apply_operation(&self, request: OperationRequest) -> AdapterClientResult<()>;
}

/// Opens client connections to adapters by host
#[async_trait]
pub trait AdapterConnector: Send + Sync {
    async fn connect(&self, host: &str) -> AdapterClientResult<Box<dyn MeshAdapterClient>>;
}

/// Connector dialing adapters over gRPC
#[derive(Debug, Clone)]
pub struct GrpcAdapterConnector {
    connect_timeout: Duration,
}

impl GrpcAdapterConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for GrpcAdapterConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// `host:port` becomes `http://host:port`; explicit schemes are kept.
pub fn endpoint_uri(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[async_trait]
impl AdapterConnector for GrpcAdapterConnector {
    #[instrument(skip(self))]
    async fn connect(&self, host: &str) -> AdapterClientResult<Box<dyn MeshAdapterClient>> {
        let uri = endpoint_uri(host);
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| AdapterClientError::InvalidEndpoint {
                endpoint: uri.clone(),
                reason: e.to_string(),
            })?
            .connect_timeout(self.connect_timeout);

        let channel = endpoint.connect().await?;
        debug!(endpoint = %uri, "Connected to adapter");

        Ok(Box::new(GrpcAdapterClient {
            inner: MeshServiceClient::new(channel),
        }))
    }
}

/// gRPC-backed adapter client
#[derive(Debug, Clone)]
pub struct GrpcAdapterClient {
    inner: MeshServiceClient,
}

#[async_trait]
impl MeshAdapterClient for GrpcAdapterClient {
    async fn supported_operations(&self) -> AdapterClientResult<BTreeSet<String>> {
        let response = self
            .inner
            .clone()
            .supported_operations(SupportedOperationsRequest {})
            .await?
            .into_inner();

        if !response.error.is_empty() {
            return Err(AdapterClientError::Adapter(response.error));
        }
        Ok(response.ops.into_iter().map(|op| op.key).collect())
    }

    async fn component_info(&self) -> AdapterClientResult<ComponentInfo> {
        let response = self
            .inner
            .clone()
            .component_info(ComponentInfoRequest {})
            .await?
            .into_inner();

        Ok(ComponentInfo {
            name: response.name,
            version: response.version,
            git_commit_sha: response.git_sha,
        })
    }

    async fn apply_operation(&self, request: OperationRequest) -> AdapterClientResult<()> {
        let wire = ApplyRuleRequest {
            op_name: request.op_name,
            namespace: request.namespace,
            username: request.username,
            custom_body: request.custom_body,
            delete_op: request.delete_op,
            operation_id: request.operation_id.to_string(),
            kube_configs: request
                .kube_configs
                .iter()
                .map(|kc| kc.expose_secret().clone())
                .collect(),
        };

        let response = self.inner.clone().apply_operation(wire).await?.into_inner();
        if !response.error.is_empty() {
            return Err(AdapterClientError::Adapter(response.error));
        }
        Ok(())
    }
}

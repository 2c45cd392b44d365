//! Wire types and client for the `meshes.MeshService` adapter protocol.
//!
//! Message layouts mirror `meshes.proto` shipped with the adapters. Only the
//! three RPCs the control plane consumes are bound here.

use tonic::codegen::http;
use tonic::transport::Channel;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SupportedOperationsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SupportedOperation {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SupportedOperationsResponse {
    #[prost(message, repeated, tag = "1")]
    pub ops: ::prost::alloc::vec::Vec<SupportedOperation>,
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ComponentInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ComponentInfoResponse {
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub version: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub git_sha: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyRuleRequest {
    #[prost(string, tag = "1")]
    pub op_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub username: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub custom_body: ::prost::alloc::string::String,
    #[prost(bool, tag = "5")]
    pub delete_op: bool,
    #[prost(string, tag = "6")]
    pub operation_id: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "7")]
    pub kube_configs: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyRuleResponse {
    #[prost(string, tag = "1")]
    pub error: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub operation_id: ::prost::alloc::string::String,
}

/// Unary client for `meshes.MeshService`.
#[derive(Debug, Clone)]
pub struct MeshServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl MeshServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn supported_operations(
        &mut self,
        request: SupportedOperationsRequest,
    ) -> Result<tonic::Response<SupportedOperationsResponse>, tonic::Status> {
        self.unary(request, "/meshes.MeshService/SupportedOperations").await
    }

    pub async fn component_info(
        &mut self,
        request: ComponentInfoRequest,
    ) -> Result<tonic::Response<ComponentInfoResponse>, tonic::Status> {
        self.unary(request, "/meshes.MeshService/ComponentInfo").await
    }

    pub async fn apply_operation(
        &mut self,
        request: ApplyRuleRequest,
    ) -> Result<tonic::Response<ApplyRuleResponse>, tonic::Status> {
        self.unary(request, "/meshes.MeshService/ApplyOperation").await
    }

    async fn unary<Req, Resp>(
        &mut self,
        request: Req,
        path: &'static str,
    ) -> Result<tonic::Response<Resp>, tonic::Status>
    where
        Req: ::prost::Message + Send + Sync + 'static,
        Resp: ::prost::Message + Default + Send + Sync + 'static,
    {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(
                tonic::Code::Unknown,
                format!("Service was not ready: {}", e),
            )
        })?;
        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        let path = http::uri::PathAndQuery::from_static(path);
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
    }
}

//! API error handling
//!
//! Service errors are mapped to an HTTP status and a machine-readable code,
//! then rendered as a JSON [`ErrorResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use mesh_control_service::{DispatchError, RegistryError};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code
    pub status: u16,

    /// Human-readable message
    pub error: String,

    /// Machine-readable code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// An error on its way to becoming an HTTP response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message).with_code("BAD_REQUEST")
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message).with_code("INTERNAL_ERROR")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), code = ?self.code, error = %self.message, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), code = ?self.code, error = %self.message, "Request rejected");
        }

        let body = ErrorResponse {
            status: self.status.as_u16(),
            error: self.message,
            code: self.code,
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::AlreadyRegistered(_) => {
                Self::new(StatusCode::CONFLICT, message).with_code("ALREADY_REGISTERED")
            }
            RegistryError::NotFound(_) => {
                Self::new(StatusCode::BAD_REQUEST, message).with_code("INVALID_ADAPTER")
            }
            RegistryError::InvalidHost(_) => {
                Self::new(StatusCode::BAD_REQUEST, message).with_code("INVALID_ADAPTER_LOCATION")
            }
            RegistryError::Connection { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, message).with_code("ADAPTER_UNREACHABLE")
            }
            RegistryError::MetadataFetch { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, message).with_code("ADAPTER_METADATA_FAILED")
            }
            RegistryError::Timeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, message).with_code("ADAPTER_TIMEOUT")
            }
            RegistryError::PortAllocation(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, message).with_code("PORTS_EXHAUSTED")
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::InvalidAdapter(_) => {
                Self::new(StatusCode::BAD_REQUEST, message).with_code("INVALID_ADAPTER")
            }
            DispatchError::InvalidClusterConfig(_) => {
                Self::new(StatusCode::BAD_REQUEST, message).with_code("INVALID_CLUSTER_CONFIG")
            }
            DispatchError::Credentials(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, message).with_code("CREDENTIAL_GENERATION_FAILED")
            }
            DispatchError::Connection { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, message).with_code("ADAPTER_UNREACHABLE")
            }
            DispatchError::Remote(_) => {
                Self::new(StatusCode::BAD_GATEWAY, message).with_code("ADAPTER_REJECTED")
            }
            DispatchError::Timeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, message).with_code("ADAPTER_TIMEOUT")
            }
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

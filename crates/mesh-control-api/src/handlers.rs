//! API request handlers
//!
//! Adapter management and operation dispatch accept the form-encoded bodies
//! the dashboard posts; everything else is plain JSON. Handlers under
//! `/api/system` extract the [`CallerIdentity`] inserted by
//! [`crate::middleware::require_caller`].

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Form, Json,
};
use futures::{Stream, StreamExt};
use mesh_control_core::{Adapter, AvailableAdapter, CallerIdentity, ControllerStatus, Status};
use mesh_control_service::{ControlPlane, DispatchReceipt, DispatchRequest, RegistryError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{ApiError, ApiResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub plane: Arc<ControlPlane>,
}

impl AppState {
    pub fn new(plane: ControlPlane) -> Self {
        Self {
            plane: Arc::new(plane),
        }
    }

    pub fn from_arc(plane: Arc<ControlPlane>) -> Self {
        Self { plane }
    }
}

// ============================================================================
// Adapter Management Handlers
// ============================================================================

/// `?adapter=` selector shared by ping and removal
#[derive(Debug, Default, Deserialize)]
pub struct AdapterQuery {
    pub adapter: Option<String>,
}

/// Registration form
#[derive(Debug, Deserialize)]
pub struct RegisterAdapterForm {
    #[serde(rename = "meshLocationURL", default)]
    pub mesh_location_url: String,
}

/// List registered adapters, or ping one when `?adapter=` is given
#[instrument(skip(state, caller), fields(caller = %caller))]
pub async fn list_adapters(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<AdapterQuery>,
) -> ApiResult<Response> {
    if let Some(host) = query.adapter.filter(|a| !a.is_empty()) {
        return ping_adapter(&state, &host).await;
    }

    let adapters = state.plane.registry().list().await;
    Ok(Json(adapters).into_response())
}

async fn ping_adapter(state: &AppState, host: &str) -> ApiResult<Response> {
    debug!(host = %host, "Pinging adapter");

    let reachable = state.plane.registry().ping(host).await?;
    if !reachable {
        return Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Adapter ping failed")
            .with_code("ADAPTER_PING_FAILED"));
    }
    Ok(Json(serde_json::json!({})).into_response())
}

/// Catalogue of known adapter locations
#[instrument(skip(state))]
pub async fn available_adapters(State(state): State<AppState>) -> Json<Vec<AvailableAdapter>> {
    Json(state.plane.catalogue().to_vec())
}

/// Register the adapter at `meshLocationURL`; returns the resulting list.
///
/// Registering a host that is already present is not an error.
#[instrument(skip(state, caller, form), fields(caller = %caller))]
pub async fn register_adapter(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Form(form): Form<RegisterAdapterForm>,
) -> ApiResult<Json<Vec<Adapter>>> {
    let location = form.mesh_location_url.trim();
    if location.is_empty() {
        return Err(ApiError::bad_request("meshLocationURL is required")
            .with_code("INVALID_ADAPTER_LOCATION"));
    }

    match state.plane.registry().add(location).await {
        Ok(adapter) => info!(host = %adapter.host, "Adapter registered"),
        Err(RegistryError::AlreadyRegistered(host)) => {
            debug!(host = %host, "Adapter already registered")
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(state.plane.registry().list().await))
}

/// Remove the adapter named by `?adapter=`; returns the resulting list.
#[instrument(skip(state, caller), fields(caller = %caller))]
pub async fn remove_adapter(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<AdapterQuery>,
) -> ApiResult<Json<Vec<Adapter>>> {
    let host = query
        .adapter
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("adapter query parameter is required"))?;

    state.plane.registry().remove(&host).await?;
    Ok(Json(state.plane.registry().list().await))
}

// ============================================================================
// Operation Handlers
// ============================================================================

/// Operation form as posted by the dashboard
#[derive(Debug, Deserialize)]
pub struct OperationForm {
    pub adapter: String,
    /// Operation name
    pub query: String,
    #[serde(rename = "customBody", default)]
    pub custom_body: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Any non-empty value requests deletion
    #[serde(rename = "deleteOp", default)]
    pub delete_op: Option<String>,
}

impl OperationForm {
    fn into_request(self) -> DispatchRequest {
        let delete_op = self.delete_op.map_or(false, |v| !v.is_empty());
        let mut request = DispatchRequest::new(self.adapter, self.query)
            .with_custom_body(self.custom_body)
            .with_delete(delete_op);
        request.namespace = self.namespace;
        request
    }
}

/// Dispatch an operation to an adapter across the caller's clusters
#[instrument(skip(state, caller, form), fields(caller = %caller, adapter = %form.adapter, op = %form.query))]
pub async fn dispatch_operation(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Form(form): Form<OperationForm>,
) -> ApiResult<Json<DispatchReceipt>> {
    let contexts = state.plane.contexts().active_contexts(&caller).await;
    let receipt = state
        .plane
        .dispatcher()
        .dispatch(form.into_request(), &caller, &contexts)
        .await?;

    Ok(Json(receipt))
}

// ============================================================================
// Sync Controller Handlers
// ============================================================================

/// Point-in-time status of the sync controller
#[instrument(skip(state))]
pub async fn controller_status(State(state): State<AppState>) -> Json<ControllerStatus> {
    Json(state.plane.status().get_status())
}

/// Stream sync controller status transitions as server-sent events.
///
/// Starts the ingestion pipeline if it is not running yet.
#[instrument(skip(state))]
pub async fn controller_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = state
        .plane
        .status()
        .stream_status()
        .await
        .map(|status| Event::default().event("status").json_data(status));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health summary
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub adapters: usize,
    pub ingestion: ControllerStatus,
}

/// Health check endpoint
///
/// Reports `degraded` while the sync controller is failing; the endpoint
/// itself always answers 200.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ingestion = state.plane.status().get_status();
    let status = match ingestion.status {
        Status::Error | Status::Degraded => "degraded",
        Status::Unknown | Status::Running => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        adapters: state.plane.registry().len().await,
        ingestion,
    })
}

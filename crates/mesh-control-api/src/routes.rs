//! Route configuration

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    available_adapters, controller_events, controller_status, dispatch_operation, health_check,
    list_adapters, register_adapter, remove_adapter, AppState,
};
use crate::middleware::require_caller;

/// Build the full router
pub fn build_router(state: AppState) -> Router {
    let system = Router::new()
        .route("/adapters", get(list_adapters))
        .route("/adapter/manage", post(register_adapter).delete(remove_adapter))
        .route("/adapter/operation", post(dispatch_operation))
        .route("/meshsync/status", get(controller_status))
        .route("/meshsync/events", get(controller_events))
        .route_layer(middleware::from_fn(require_caller))
        // the catalogue is public
        .route("/adapters/available", get(available_adapters));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/system", system)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

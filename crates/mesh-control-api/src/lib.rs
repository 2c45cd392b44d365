//! HTTP API for the mesh control plane
//!
//! Exposes adapter registration, removal, listing and ping, operation
//! dispatch, and the sync controller's status (point-in-time and as a
//! server-sent event stream).
//!
//! # Example
//!
//! ```rust,no_run
//! use mesh_control_api::{build_router, AppState};
//! # use mesh_control_service::ControlPlane;
//! # async fn example(plane: ControlPlane) {
//! let app = build_router(AppState::new(plane));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:9081").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{AppState, HealthResponse};
pub use middleware::HEADER_USER_ID;
pub use routes::build_router;

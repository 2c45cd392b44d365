//! Caller identity middleware
//!
//! Every `/api/system/*` request must name the user it acts for. The
//! upstream gateway authenticates the user and forwards the identifier in
//! the `x-user-id` header; requests without it are rejected with 400 Bad
//! Request. On success a [`CallerIdentity`] is inserted into the request
//! extensions for handlers to extract.

use axum::{extract::Request, middleware::Next, response::Response};
use mesh_control_core::CallerIdentity;
use tracing::debug;

use crate::error::ApiError;

/// Header carrying the authenticated user id
pub const HEADER_USER_ID: &str = "x-user-id";

pub async fn require_caller(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = request
        .headers()
        .get(HEADER_USER_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("Missing required header: X-User-Id").with_code("MISSING_CALLER")
        })?;

    let caller = CallerIdentity::new(user_id);
    debug!(caller = %caller, "Caller identified");

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

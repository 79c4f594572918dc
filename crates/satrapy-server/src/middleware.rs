//! Authentication middleware.
//!
//! Verifies the HMAC `Authorization` header on every API route. The
//! health probes are mounted outside this layer and never pass through
//! here.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use satrapy_core::auth;

use crate::state::AppState;

/// Reject any request whose `Authorization` header does not verify
/// against the cluster token.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let Some(header) = header else {
        return unauthorized("missing Authorization header");
    };

    match auth::verify_header(header, &state.token) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            debug!(error = %e, "request rejected");
            unauthorized("invalid Authorization header")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": { "kind": "Unauthorized", "message": message }
        })),
    )
        .into_response()
}

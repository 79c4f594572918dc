//! The agent's HTTP surface.
//!
//! A small authenticated API for pushing ad-hoc changes straight into
//! the local runtime — useful for operators and for control-plane
//! components that need a change applied before the next sync tick.
//! Gated by the per-node token, not the cluster token.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self as axum_mw, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use satrapy_core::auth;
use satrapy_core::proxy::{Count, InboundConfig, InboundUser};
use satrapy_core::{Error, ErrorKind};

use crate::runtime::InboundRuntime;

/// State shared by the surface handlers.
pub struct AgentState {
    pub runtime: Arc<dyn InboundRuntime>,
    /// Per-node token for HMAC verification.
    pub token: String,
}

/// Local error adapter; same envelope and status mapping as the
/// apiserver's.
struct SurfaceError(Error);

impl From<Error> for SurfaceError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for SurfaceError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::new(
            ErrorKind::Invalid,
            satrapy_core::ErrorReason::UnmarshalFailed,
            rejection.body_text(),
        ))
    }
}

impl IntoResponse for SurfaceError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::CapacityExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0 }))).into_response()
    }
}

/// Build the agent surface router.
pub fn router(state: Arc<AgentState>) -> Router {
    let api = Router::new()
        .route("/inbounds", post(add_inbound))
        .route("/inbounds/count", get(count_inbounds))
        .route("/inbounds/{tag}", delete(remove_inbound))
        .route("/inbounds/{tag}/users", post(add_user))
        .route("/inbounds/{tag}/users/{email}", delete(remove_user))
        .route_layer(axum_mw::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/v1", api)
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auth_middleware(
    State(state): State<Arc<AgentState>>,
    req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let verified = header.is_some_and(|h| auth::verify_header(h, &state.token).is_ok());
    if verified {
        next.run(req).await
    } else {
        debug!("request rejected by node token");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": { "kind": "Unauthorized", "message": "invalid Authorization header" }
            })),
        )
            .into_response()
    }
}

async fn livez() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AgentState>>) -> StatusCode {
    match state.runtime.list_inbounds().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn add_inbound(
    State(state): State<Arc<AgentState>>,
    body: Result<Json<InboundConfig>, JsonRejection>,
) -> Result<StatusCode, SurfaceError> {
    let Json(config) = body?;
    state.runtime.add_inbound(&config).await?;
    info!(resource = "inbound", action = "create", tag = %config.tag, "applied");
    Ok(StatusCode::CREATED)
}

async fn remove_inbound(
    State(state): State<Arc<AgentState>>,
    Path(tag): Path<String>,
) -> Result<StatusCode, SurfaceError> {
    state.runtime.remove_inbound(&tag).await?;
    info!(resource = "inbound", action = "delete", tag = %tag, "applied");
    Ok(StatusCode::NO_CONTENT)
}

async fn count_inbounds(
    State(state): State<Arc<AgentState>>,
) -> Result<Json<Count>, SurfaceError> {
    let inbounds = state.runtime.list_inbounds().await?;
    let count = u32::try_from(inbounds.len()).unwrap_or(u32::MAX);
    Ok(Json(Count { count }))
}

async fn add_user(
    State(state): State<Arc<AgentState>>,
    Path(tag): Path<String>,
    body: Result<Json<InboundUser>, JsonRejection>,
) -> Result<StatusCode, SurfaceError> {
    let Json(user) = body?;
    // A blob that does not parse is the caller's fault, not ours.
    let account = user.account().map_err(|e| {
        Error::new(
            ErrorKind::Invalid,
            satrapy_core::ErrorReason::UnmarshalFailed,
            e.to_string(),
        )
    })?;
    state
        .runtime
        .add_user(&tag, &user.spec.email, &account)
        .await?;
    info!(resource = "user", action = "create", tag = %tag, email = %user.spec.email, "applied");
    Ok(StatusCode::CREATED)
}

async fn remove_user(
    State(state): State<Arc<AgentState>>,
    Path((tag, email)): Path<(String, String)>,
) -> Result<StatusCode, SurfaceError> {
    state.runtime.remove_user(&tag, &email).await?;
    info!(resource = "user", action = "delete", tag = %tag, email = %email, "applied");
    Ok(StatusCode::NO_CONTENT)
}

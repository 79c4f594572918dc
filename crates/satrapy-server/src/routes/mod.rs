//! Route assembly.

mod inbounds;
mod nodes;
mod users;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware as axum_mw;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{extract::State, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Build the full apiserver router: authenticated `/api/v1` routes plus
/// the unauthenticated probes.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(nodes::router())
        .merge(inbounds::router())
        .merge(users::router())
        .route_layer(axum_mw::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/v1", api)
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn livez() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.readiness_check().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

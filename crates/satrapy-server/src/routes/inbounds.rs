//! Inbound routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use tracing::info;

use satrapy_core::meta::ObjectMeta;
use satrapy_core::proxy::{Count, Inbound, InboundSpec};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/nodes/{name}/inbounds",
            get(list_inbounds).post(create_inbound),
        )
        .route("/nodes/{name}/inbounds/count", get(count_inbounds))
        .route(
            "/nodes/{name}/inbounds/{tag}",
            get(get_inbound).delete(delete_inbound),
        )
        .route("/nodes/{name}/inbounds/{tag}/metadata", patch(update_metadata))
        .route("/nodes/{name}/inbounds/{tag}/spec", patch(update_spec))
}

async fn list_inbounds(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Inbound>>, ApiError> {
    let inbounds = state.inbounds.get_inbounds(&name).await?;
    Ok(Json(inbounds))
}

async fn count_inbounds(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Count>, ApiError> {
    let count = state.inbounds.count_inbounds(&name).await?;
    Ok(Json(Count { count }))
}

async fn get_inbound(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Json<Inbound>, ApiError> {
    let inbound = state.inbounds.get_inbound(&name, &tag).await?;
    Ok(Json(inbound))
}

async fn create_inbound(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<Inbound>, JsonRejection>,
) -> Result<(StatusCode, Json<Inbound>), ApiError> {
    let Json(inbound) = body?;
    let created = state.inbounds.create_inbound(&name, inbound).await?;
    info!(
        resource = "inbound",
        action = "create",
        node = %name,
        tag = %created.spec.config.tag,
        "created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_inbound(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.inbounds.delete_inbound(&name, &tag).await?;
    info!(resource = "inbound", action = "delete", node = %name, tag = %tag, "deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_metadata(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
    body: Result<Json<ObjectMeta>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(metadata) = body?;
    state
        .inbounds
        .update_inbound_metadata(&name, &tag, metadata)
        .await?;
    Ok(StatusCode::OK)
}

async fn update_spec(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
    body: Result<Json<InboundSpec>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(spec) = body?;
    state.inbounds.update_inbound_spec(&name, &tag, spec).await?;
    Ok(StatusCode::OK)
}

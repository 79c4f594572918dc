//! Node routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use tracing::info;

use satrapy_core::meta::ObjectMeta;
use satrapy_core::node::{Node, NodeSpec, NodeStatus};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/nodes", get(list_nodes).post(create_node))
        .route("/nodes/active", get(list_active_nodes))
        .route("/nodes/{name}", get(get_node).delete(delete_node))
        .route("/nodes/{name}/status", patch(update_status))
        .route("/nodes/{name}/metadata", patch(update_metadata))
        .route("/nodes/{name}/spec", patch(update_spec))
}

async fn list_nodes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Node>>, ApiError> {
    let nodes = state.nodes.get_nodes().await?;
    info!(resource = "node", action = "list", count = nodes.len(), "retrieved");
    Ok(Json(nodes))
}

async fn list_active_nodes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let nodes = state.nodes.get_active_nodes().await?;
    info!(resource = "node", action = "list-active", count = nodes.len(), "retrieved");
    Ok(Json(nodes))
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let node = state.nodes.get_node(&name).await?;
    Ok(Json(node))
}

async fn create_node(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Node>, JsonRejection>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let Json(node) = body?;
    let created = state.nodes.create_node(node).await?;
    info!(resource = "node", action = "create", node = %created.metadata.name, "created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.nodes.delete_node(&name).await?;
    info!(resource = "node", action = "delete", node = %name, "deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<NodeStatus>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(status) = body?;
    state.nodes.update_status(&name, status).await?;
    Ok(StatusCode::OK)
}

async fn update_metadata(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<ObjectMeta>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(metadata) = body?;
    state.nodes.update_metadata(&name, metadata).await?;
    info!(resource = "node", action = "update-metadata", node = %name, "updated");
    Ok(StatusCode::OK)
}

async fn update_spec(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<NodeSpec>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(spec) = body?;
    state.nodes.update_spec(&name, spec).await?;
    info!(resource = "node", action = "update-spec", node = %name, "updated");
    Ok(StatusCode::OK)
}

//! Inbound-user routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use tracing::info;

use satrapy_core::meta::ObjectMeta;
use satrapy_core::proxy::{Count, InboundUser, InboundUserSpec};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/nodes/{name}/inbounds/{tag}/users",
            get(list_users).post(create_user),
        )
        .route("/nodes/{name}/inbounds/{tag}/users/count", get(count_users))
        .route(
            "/nodes/{name}/inbounds/{tag}/users/{email}",
            get(get_user).delete(delete_user),
        )
        .route(
            "/nodes/{name}/inbounds/{tag}/users/{email}/metadata",
            patch(update_metadata),
        )
        .route(
            "/nodes/{name}/inbounds/{tag}/users/{email}/spec",
            patch(update_spec),
        )
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Json<Vec<InboundUser>>, ApiError> {
    let users = state.inbounds.get_users(&name, &tag).await?;
    Ok(Json(users))
}

async fn count_users(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Json<Count>, ApiError> {
    let count = state.inbounds.count_users(&name, &tag).await?;
    Ok(Json(Count { count }))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path((name, tag, email)): Path<(String, String, String)>,
) -> Result<Json<InboundUser>, ApiError> {
    let user = state.inbounds.get_user(&name, &tag, &email).await?;
    Ok(Json(user))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Path((name, tag)): Path<(String, String)>,
    body: Result<Json<InboundUser>, JsonRejection>,
) -> Result<(StatusCode, Json<InboundUser>), ApiError> {
    let Json(user) = body?;
    let created = state.inbounds.create_user(&name, &tag, user).await?;
    info!(
        resource = "user",
        action = "create",
        node = %name,
        tag = %tag,
        email = %created.spec.email,
        "created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path((name, tag, email)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    state.inbounds.delete_user(&name, &tag, &email).await?;
    info!(resource = "user", action = "delete", node = %name, tag = %tag, email = %email, "deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_metadata(
    State(state): State<Arc<AppState>>,
    Path((name, tag, email)): Path<(String, String, String)>,
    body: Result<Json<ObjectMeta>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(metadata) = body?;
    state
        .inbounds
        .update_user_metadata(&name, &tag, &email, metadata)
        .await?;
    Ok(StatusCode::OK)
}

async fn update_spec(
    State(state): State<Arc<AppState>>,
    Path((name, tag, email)): Path<(String, String, String)>,
    body: Result<Json<InboundUserSpec>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(spec) = body?;
    state
        .inbounds
        .update_user_spec(&name, &tag, &email, spec)
        .await?;
    Ok(StatusCode::OK)
}

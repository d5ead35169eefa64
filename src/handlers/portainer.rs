//! Stack and container endpoints backed by the control plane

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::models::{ContainerAction, StackAction};
use crate::portainer::endpoint_id;
use crate::state::AppState;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct EndpointNameQuery {
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StacksQuery {
    pub endpoint_id: i64,
    #[serde(default)]
    pub skeleton: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainersQuery {
    pub endpoint_id: i64,
    pub stack_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatusQuery {
    pub endpoint_id: i64,
    pub container_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointBody {
    pub endpoint_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecreateContainerBody {
    pub endpoint_id: i64,
    pub container_id: String,
    #[serde(default)]
    pub pull_image: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStackBody {
    pub endpoint_id: i64,
    /// Must match the path id when given
    #[serde(default)]
    pub stack_id: Option<i64>,
    #[serde(default)]
    pub prune: bool,
    #[serde(default)]
    pub pull_image: bool,
}

/// Endpoint id by name, `-1` when unknown
pub async fn endpoint_handler(
    State(state): State<AppState>,
    Query(query): Query<EndpointNameQuery>,
) -> AppResult<Json<Value>> {
    let id = endpoint_id(state.upstream.as_ref(), &query.endpoint).await?;
    Ok(Json(json!({
        "message": "ok",
        "endpointId": id.unwrap_or(-1)
    })))
}

pub async fn stacks_handler(
    State(state): State<AppState>,
    Query(query): Query<StacksQuery>,
) -> AppResult<Json<Value>> {
    let stacks = state
        .inventory
        .stacks(query.endpoint_id, !query.skeleton)
        .await?;
    Ok(Json(json!({
        "message": "ok",
        "stacks": stacks
    })))
}

pub async fn containers_handler(
    State(state): State<AppState>,
    Query(query): Query<ContainersQuery>,
) -> AppResult<Json<Value>> {
    let containers = state
        .inventory
        .containers(query.endpoint_id, &query.stack_name)
        .await?;
    Ok(Json(json!({
        "message": "ok",
        "containers": containers
    })))
}

pub async fn image_status_handler(
    State(state): State<AppState>,
    Query(query): Query<ImageStatusQuery>,
) -> AppResult<Json<Value>> {
    let status = state
        .inventory
        .container_status(query.endpoint_id, &query.container_id)
        .await?;
    Ok(Json(json!({
        "message": "ok",
        "status": status
    })))
}

pub async fn recreate_container_handler(
    State(state): State<AppState>,
    Json(body): Json<RecreateContainerBody>,
) -> AppResult<Json<Value>> {
    let new_id = state
        .upstream
        .recreate_container(body.endpoint_id, &body.container_id, body.pull_image)
        .await?;
    state.cache.forget(&body.container_id);

    info!("Recreated container {} as {}", body.container_id, new_id);
    Ok(Json(json!({
        "message": "Container recreated",
        "containerId": new_id
    })))
}

pub async fn container_action_handler(
    State(state): State<AppState>,
    Path((container_id, action)): Path<(String, String)>,
    Json(body): Json<EndpointBody>,
) -> AppResult<Json<Value>> {
    let action: ContainerAction = action.parse().map_err(AppError::BadRequest)?;
    state
        .upstream
        .manage_container(body.endpoint_id, &container_id, action)
        .await?;
    Ok(Json(json!({
        "message": format!("Container {} {}", container_id, action),
    })))
}

async fn start_or_stop(state: &AppState, stack_id: i64, endpoint_id: i64, action: StackAction) -> AppResult<Json<Value>> {
    let name = state
        .upstream
        .start_or_stop_stack(endpoint_id, stack_id, action)
        .await?;
    Ok(Json(json!({
        "message": format!("Stack {} {} requested", name, action),
        "stackName": name
    })))
}

pub async fn start_stack_handler(
    State(state): State<AppState>,
    Path(stack_id): Path<i64>,
    Json(body): Json<EndpointBody>,
) -> AppResult<Json<Value>> {
    start_or_stop(&state, stack_id, body.endpoint_id, StackAction::Start).await
}

pub async fn stop_stack_handler(
    State(state): State<AppState>,
    Path(stack_id): Path<i64>,
    Json(body): Json<EndpointBody>,
) -> AppResult<Json<Value>> {
    start_or_stop(&state, stack_id, body.endpoint_id, StackAction::Stop).await
}

/// Queue a stack redeploy; progress is reported on the status feed
pub async fn update_stack_handler(
    State(state): State<AppState>,
    Path(stack_id): Path<i64>,
    Json(body): Json<UpdateStackBody>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if let Some(id) = body.stack_id {
        if id != stack_id {
            return Err(AppError::BadRequest(format!(
                "stack id {} does not match path id {}",
                id, stack_id
            )));
        }
    }

    let queued = state
        .updater
        .enqueue(body.endpoint_id, stack_id, body.prune, body.pull_image)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Stack update queued",
            "status": queued
        })),
    ))
}

//! Control run endpoints

use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBody {
    pub endpoint_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlBody {
    pub endpoint_id: i64,
}

pub async fn sync_handler(
    State(state): State<AppState>,
    Json(body): Json<SyncBody>,
) -> AppResult<Json<Value>> {
    if body.endpoint_ids.is_empty() {
        return Err(AppError::BadRequest("at least one endpoint id is required".to_string()));
    }
    let report = state.controller.trigger_sync(&body.endpoint_ids).await?;
    Ok(Json(json!({
        "message": "Sync completed",
        "report": report
    })))
}

pub async fn sync_autostart_handler(
    State(state): State<AppState>,
    Json(body): Json<ControlBody>,
) -> AppResult<Json<Value>> {
    let report = state.controller.sync_autostart_state(body.endpoint_id).await?;
    Ok(Json(json!({
        "message": "Auto-start state synced",
        "report": report
    })))
}

pub async fn stop_all_handler(
    State(state): State<AppState>,
    Json(body): Json<ControlBody>,
) -> AppResult<Json<Value>> {
    let report = state.controller.stop_all_stacks(body.endpoint_id).await?;
    Ok(Json(json!({
        "message": "All stacks stopped",
        "report": report
    })))
}

/// Forced image status sweep
pub async fn refresh_images_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let report = state.poller.run_cycle(true).await?;
    Ok(Json(json!({
        "message": "Image statuses refreshed",
        "report": report
    })))
}

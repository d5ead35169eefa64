//! Stack settings and ignored image endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{IgnoredImage, StackSettings};
use crate::settings::sorted_by_priority;
use crate::state::AppState;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsQuery {
    #[serde(default)]
    pub update_prio: bool,
}

pub async fn list_settings_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let rows = sorted_by_priority(state.store.get_all().await?);
    Ok(Json(json!({
        "message": "ok",
        "stackSettings": rows
    })))
}

pub async fn get_settings_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    let row = state.store.get_by_name(&name).await?;
    Ok(Json(json!({
        "message": "ok",
        "stackSettings": row
    })))
}

pub async fn create_settings_handler(
    State(state): State<AppState>,
    Json(row): Json<StackSettings>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if row.stack_name.trim().is_empty() {
        return Err(AppError::BadRequest("stack name is required".to_string()));
    }
    state.store.create(row.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Stack settings created successfully.",
            "stackSettings": row
        })),
    ))
}

/// Replace one row, or with `updatePrio=true` move it to the body's priority
pub async fn update_settings_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<UpdateSettingsQuery>,
    Json(row): Json<StackSettings>,
) -> AppResult<Json<Value>> {
    if query.update_prio {
        let ordered = state.reconciler.move_stack(&name, row.priority).await?;
        return Ok(Json(json!({
            "message": "Stack priority updated successfully.",
            "stackSettings": ordered
        })));
    }

    state.store.replace(&name, row.clone()).await?;
    Ok(Json(json!({
        "message": "Stack settings updated successfully.",
        "stackSettings": row
    })))
}

pub async fn delete_settings_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    state.store.delete(&name).await?;
    Ok(Json(json!({
        "message": "Stack settings deleted successfully."
    })))
}

pub async fn list_ignored_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let images = state.store.ignored_images().await?;
    Ok(Json(json!({
        "message": "ok",
        "ignoredImages": images
    })))
}

pub async fn add_ignored_handler(
    State(state): State<AppState>,
    Json(image): Json<IgnoredImage>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if image.name.trim().is_empty() {
        return Err(AppError::BadRequest("image name is required".to_string()));
    }
    state.store.add_ignored_image(image.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Image ignored.",
            "ignoredImage": image
        })),
    ))
}

pub async fn remove_ignored_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    state.store.remove_ignored_image(&name).await?;
    Ok(Json(json!({
        "message": "Image no longer ignored."
    })))
}

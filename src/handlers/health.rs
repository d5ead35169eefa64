//! Health check endpoint handler

use axum::{extract::State, response::Json};
use serde_json::json;

use crate::state::AppState;
use crate::utils::time::current_timestamp_secs;

/// Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "pollerRunning": state.poller.is_running().await,
        "lastImageRefresh": state.cache.last_refresh(),
        "knownImageStatuses": state.cache.fallback_len(),
        "queuedUpdates": state.updater.snapshot().len(),
        "timestamp": current_timestamp_secs()
    }))
}

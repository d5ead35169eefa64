//! HTTP request handlers

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

mod control;
mod health;
mod portainer;
mod settings;
mod ws;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health::health_handler))
        .route("/portainer/endpoint", get(portainer::endpoint_handler))
        .route("/portainer/stacks", get(portainer::stacks_handler))
        .route("/portainer/containers", get(portainer::containers_handler))
        .route("/portainer/image-status", get(portainer::image_status_handler))
        .route("/portainer/update-container", post(portainer::recreate_container_handler))
        .route(
            "/portainer/containers/:container_id/:action",
            post(portainer::container_action_handler),
        )
        .route("/portainer/stacks/:id/start", post(portainer::start_stack_handler))
        .route("/portainer/stacks/:id/stop", post(portainer::stop_stack_handler))
        .route("/portainer/stacks/:id/update", put(portainer::update_stack_handler))
        .route("/ws/stacks-update", get(ws::stacks_update_handler))
        .route(
            "/db/stacks",
            get(settings::list_settings_handler).post(settings::create_settings_handler),
        )
        .route(
            "/db/stacks/:name",
            get(settings::get_settings_handler)
                .put(settings::update_settings_handler)
                .delete(settings::delete_settings_handler),
        )
        .route("/db/sync", post(control::sync_handler))
        .route(
            "/db/ignored-images",
            get(settings::list_ignored_handler).post(settings::add_ignored_handler),
        )
        .route("/db/ignored-images/:name", delete(settings::remove_ignored_handler))
        .route("/control/sync-autostart", post(control::sync_autostart_handler))
        .route("/control/stop-all", post(control::stop_all_handler))
        .route("/control/refresh-images", post(control::refresh_images_handler));

    let mut app = Router::new()
        .nest("/api", api)
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&state.config.cors) {
        app = app.layer(cors);
    }

    app.with_state(state)
}

/// CORS for the configured origins; `None` when no origin is configured
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "PAGE_NOT_FOUND",
            "message": "Page not found"
        })),
    )
}

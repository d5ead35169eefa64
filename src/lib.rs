//! Washboard Library
//! Stack status caching, settings reconciliation and autostart control for
//! Docker stacks managed through a Portainer control plane.

pub mod cache;
pub mod config;
pub mod control;
pub mod feed;
pub mod handlers;
pub mod models;
pub mod portainer;
pub mod settings;
pub mod state;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use config::Config;
pub use state::AppState;
pub use utils::errors::{AppError, AppResult};

//! Washboard service
//! Control panel backend for Docker stacks managed through Portainer: stack
//! settings, auto-start control, image status caching and an update feed.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use washboard::config::{Args, Config};
use washboard::handlers;
use washboard::state::AppState;
use washboard::AppError;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::from_args(args)?;

    info!("Starting Washboard");
    info!("Portainer URL: {}", config.portainer_url);
    info!("Settings file: {:?}", config.settings_file);

    let state = AppState::new(config.clone())
        .await
        .context("Failed to initialize services")?;

    // Background image status refresh
    state.poller.start().await;

    if config.start_stacks_on_launch {
        let controller = state.controller.clone();
        let endpoint_id = config.start_endpoint_id;
        tokio::spawn(async move {
            match controller.sync_autostart_state(endpoint_id).await {
                Ok(report) => info!(
                    "Launch auto-start: {} started, {} restored",
                    report.started.len(),
                    report.restarted.len()
                ),
                Err(AppError::AlreadyInProgress(_)) => {
                    warn!("Launch auto-start skipped, a sync is already running")
                }
                Err(e) => error!("Launch auto-start failed: {}", e),
            }
        });
    }

    let app = handlers::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Washboard listening on http://0.0.0.0:{}", config.port);

    // Handle graceful shutdown
    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    state.poller.stop().await;
    info!("Washboard shutdown complete");
    Ok(())
}

//! Service graph shared by the HTTP handlers and the background tasks
//!
//! Everything is constructed once at startup and handed out through `Arc`s;
//! nothing here is a global.

use crate::cache::StatusCache;
use crate::config::Config;
use crate::control::{AutoStartController, SingleFlight, StackUpdater};
use crate::portainer::{ControlPlane, PortainerClient};
use crate::settings::{LocalSettingsStore, Reconciler, SettingsStore};
use crate::sync::{BackgroundPoller, StackInventory};
use crate::utils::errors::AppResult;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn ControlPlane>,
    pub store: Arc<dyn SettingsStore>,
    pub cache: Arc<StatusCache>,
    pub inventory: Arc<StackInventory>,
    pub reconciler: Reconciler,
    pub controller: Arc<AutoStartController>,
    pub updater: StackUpdater,
    pub poller: Arc<BackgroundPoller>,
}

impl AppState {
    /// Production wiring: Portainer over HTTP, settings in the configured JSON file
    pub async fn new(config: Config) -> AppResult<Self> {
        let upstream = Arc::new(PortainerClient::new(
            config.portainer_url.clone(),
            config.portainer_secret.clone(),
            config.request_timeout(),
        )?);

        let store: Arc<dyn SettingsStore> = match &config.settings_file {
            Some(path) => Arc::new(LocalSettingsStore::open(path.clone(), config.request_timeout()).await?),
            None => Arc::new(LocalSettingsStore::in_memory(config.request_timeout())),
        };

        Ok(Self::with_services(config, upstream, store))
    }

    /// Wire the graph around the given control plane and settings store
    pub fn with_services(config: Config, upstream: Arc<dyn ControlPlane>, store: Arc<dyn SettingsStore>) -> Self {
        let cache = Arc::new(StatusCache::new(config.cache_ttl()));
        let inventory = Arc::new(
            StackInventory::new(
                upstream.clone(),
                store.clone(),
                cache.clone(),
                config.protected_images.clone(),
            )
            .with_fetch_concurrency(config.status_fetch_concurrency),
        );
        let reconciler = Reconciler::new(store.clone());
        let controller = Arc::new(AutoStartController::new(
            inventory.clone(),
            reconciler.clone(),
            SingleFlight::new(),
        ));
        let updater = StackUpdater::new(upstream.clone(), cache.clone());
        let poller = Arc::new(BackgroundPoller::new(
            inventory.clone(),
            vec![config.start_endpoint_id],
            config.poll_interval(),
        ));

        Self {
            config: Arc::new(config),
            upstream,
            store,
            cache,
            inventory,
            reconciler,
            controller,
            updater,
            poller,
        }
    }
}

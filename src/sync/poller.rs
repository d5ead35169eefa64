//! Periodic image status refresh

use crate::sync::inventory::StackInventory;
use crate::utils::errors::{AppError, AppResult};
use crate::utils::time::now;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// The cycle was coalesced with a recent one
    pub skipped: bool,
    pub stacks: usize,
    pub fetched: usize,
    pub from_cache: usize,
    pub aggregate_skips: usize,
    pub failures: usize,
}

/// Refreshes the status cache for every stack of the polled endpoints
pub struct BackgroundPoller {
    inventory: Arc<StackInventory>,
    endpoint_ids: Vec<i64>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
    polling: Mutex<()>,
}

impl BackgroundPoller {
    pub fn new(inventory: Arc<StackInventory>, endpoint_ids: Vec<i64>, interval: Duration) -> Self {
        Self {
            inventory,
            endpoint_ids,
            interval,
            running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
            polling: Mutex::new(()),
        }
    }

    /// Run one sweep.
    ///
    /// Without `force` the sweep is skipped when the last one finished within
    /// the polling interval. A sweep already in progress rejects the call.
    pub async fn run_cycle(&self, force: bool) -> AppResult<SweepReport> {
        let cache = self.inventory.cache();
        if !force && cache.refreshed_within(self.interval, now()) {
            debug!("Image status refreshed recently, skipping sweep");
            return Ok(SweepReport {
                skipped: true,
                ..Default::default()
            });
        }

        let Ok(_polling) = self.polling.try_lock() else {
            return Err(AppError::AlreadyInProgress("image status refresh".to_string()));
        };

        let mut report = SweepReport::default();
        for endpoint_id in &self.endpoint_ids {
            let mut stacks = match self.inventory.live_stacks(*endpoint_id).await {
                Ok(stacks) => stacks,
                Err(e) => {
                    warn!("Failed to list stacks of endpoint {}: {}", endpoint_id, e);
                    report.failures += 1;
                    continue;
                }
            };
            report.stacks += stacks.len();

            match self
                .inventory
                .resolve_statuses(*endpoint_id, &mut stacks, true)
                .await
            {
                Ok(stats) => {
                    report.fetched += stats.fetched;
                    report.from_cache += stats.from_cache;
                    report.aggregate_skips += stats.aggregate_skips;
                    report.failures += stats.failed;
                }
                Err(e) => {
                    warn!("Image status sweep of endpoint {} failed: {}", endpoint_id, e);
                    report.failures += 1;
                }
            }
        }

        let purged = cache.purge_expired();
        cache.mark_refreshed(now());

        info!(
            "Image status sweep done: {} stacks, {} fetched, {} aggregate skips, {} failures ({} expired entries purged)",
            report.stacks, report.fetched, report.aggregate_skips, report.failures, purged
        );
        Ok(report)
    }

    /// Start the polling loop: one sweep immediately, then one per interval
    pub async fn start(self: &Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let poller = self.clone();
        let running = self.running.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.interval;

        info!(
            "Image status poller started (interval: {}h)",
            interval.as_secs() / 3600
        );

        std::mem::drop(tokio::spawn(async move {
            while *running.read().await {
                match poller.run_cycle(false).await {
                    Ok(_) => {}
                    Err(AppError::AlreadyInProgress(_)) => {
                        debug!("Sweep already running, waiting for next tick");
                    }
                    Err(e) => error!("Image status sweep failed: {}", e),
                }

                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = shutdown.notified() => {}
                }
            }
            info!("Image status poller stopped");
        }));
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        self.shutdown.notify_waiters();
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StatusCache;
    use crate::models::ImageStatus;
    use crate::settings::LocalSettingsStore;
    use crate::testing::{container_in, FakeControlPlane};

    fn poller(fake: Arc<FakeControlPlane>) -> (Arc<BackgroundPoller>, Arc<StatusCache>) {
        let cache = Arc::new(StatusCache::new(Duration::from_secs(60)));
        let store = Arc::new(LocalSettingsStore::in_memory(Duration::from_secs(1)));
        let inventory = Arc::new(StackInventory::new(fake, store, cache.clone(), vec![]));
        let poller = Arc::new(BackgroundPoller::new(
            inventory,
            vec![1],
            Duration::from_secs(24 * 3600),
        ));
        (poller, cache)
    }

    #[tokio::test]
    async fn test_sweep_skips_clean_stacks_and_survives_failures() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(1, 10, "clean");
        fake.add_stack(1, 11, "dirty");
        fake.add_container(1, container_in("c1", "clean", "nginx", "running"));
        fake.add_container(1, container_in("c2", "dirty", "redis", "running"));
        fake.add_container(1, container_in("c3", "dirty", "postgres", "running"));
        fake.set_stack_status(10, ImageStatus::Updated);
        fake.set_stack_status(11, ImageStatus::Outdated);
        fake.set_container_status("c2", ImageStatus::Outdated);
        fake.fail_container_status("c3");

        let (poller, cache) = poller(fake.clone());
        let report = poller.run_cycle(true).await.unwrap();

        assert_eq!(report.stacks, 2);
        assert_eq!(report.aggregate_skips, 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(cache.get_fallback("c1"), Some(ImageStatus::Updated));
        assert_eq!(cache.get_fallback("c2"), Some(ImageStatus::Outdated));
        assert_eq!(cache.get_fallback("c3"), None);
        assert!(cache.last_refresh().is_some());
    }

    #[tokio::test]
    async fn test_recent_refresh_coalesces_cycle() {
        let fake = Arc::new(FakeControlPlane::new());
        let (poller, cache) = poller(fake.clone());
        cache.mark_refreshed(now());

        let report = poller.run_cycle(false).await.unwrap();
        assert!(report.skipped);
        assert_eq!(fake.stack_status_calls(), 0);
    }

    #[tokio::test]
    async fn test_known_outdated_stack_skips_aggregate() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(1, 10, "media");
        fake.add_container(1, container_in("c1", "media", "jellyfin", "running"));
        fake.add_container(1, container_in("c2", "media", "redis", "running"));
        fake.set_container_status("c2", ImageStatus::Updated);

        let (poller, cache) = poller(fake.clone());
        cache.set_fallback("c1", ImageStatus::Outdated);

        let report = poller.run_cycle(true).await.unwrap();
        assert_eq!(fake.stack_status_calls(), 0);
        // c1 is already known to be outdated, only c2 goes upstream
        assert_eq!(fake.container_status_calls(), 1);
        assert_eq!(report.from_cache, 1);
    }

    #[tokio::test]
    async fn test_forced_sweep_refetches_live_entries() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(1, 10, "media");
        fake.add_container(1, container_in("c1", "media", "jellyfin", "running"));
        fake.set_stack_status(10, ImageStatus::Outdated);
        fake.set_container_status("c1", ImageStatus::Outdated);

        let (poller, cache) = poller(fake.clone());
        cache.set("c1", ImageStatus::Updated);

        let report = poller.run_cycle(true).await.unwrap();
        assert_eq!(fake.container_status_calls(), 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(cache.get("c1"), Some(ImageStatus::Outdated));
        assert_eq!(cache.get_fallback("c1"), Some(ImageStatus::Outdated));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let fake = Arc::new(FakeControlPlane::new());
        let (poller, _cache) = poller(fake);
        poller.start().await;
        assert!(poller.is_running().await);
        poller.stop().await;
        assert!(!poller.is_running().await);
    }
}

//! Single-flight guards for exclusive operations
//!
//! A guard is a marker with a short TTL. Holding it keeps concurrent callers
//! out; dropping it releases the marker. If a holder never drops (task aborted
//! mid-run) the marker expires on its own.

use crate::cache::TtlCache;
use crate::utils::errors::{AppError, AppResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const SYNC: &str = "sync";
pub const SYNC_AUTOSTART: &str = "syncAutoStartState";
pub const STOP_ALL: &str = "stopAllStacks";

#[derive(Clone)]
pub struct SingleFlight {
    markers: Arc<TtlCache<String, u64>>,
    generation: Arc<AtomicU64>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            markers: Arc::new(TtlCache::permanent()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take the guard for `key` or fail immediately with `AlreadyInProgress`
    pub fn acquire(&self, key: &str, ttl: Duration) -> AppResult<FlightGuard> {
        let token = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        match self.markers.try_insert(key.to_string(), token, Some(ttl), |_| false) {
            Ok(()) => {
                debug!("Acquired guard {}", key);
                Ok(FlightGuard {
                    markers: self.markers.clone(),
                    key: key.to_string(),
                    token,
                })
            }
            Err(_) => Err(AppError::AlreadyInProgress(key.to_string())),
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.markers.contains(&key.to_string())
    }
}

/// Releases its marker on drop, unless the marker expired and was taken by someone else
pub struct FlightGuard {
    markers: Arc<TtlCache<String, u64>>,
    key: String,
    token: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let token = self.token;
        if self.markers.remove_if(&self.key, |held| *held == token) {
            debug!("Released guard {}", self.key);
        }
    }
}

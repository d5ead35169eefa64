//! Two-tier image status cache
//!
//! The live tier holds statuses fetched within the configured TTL. The fallback
//! tier never expires and only ever receives known-good statuses, so a failed
//! live fetch can never erase the last good answer for a container.

use crate::cache::ttl::TtlCache;
use crate::models::ImageStatus;
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::Duration;

/// Outcome of a cache lookup for one container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Fresh entry in the live tier
    Live(ImageStatus),
    /// Only the last known-good status is available
    Fallback(ImageStatus),
    Miss,
}

impl Lookup {
    /// Whether the caller should ask the control plane
    pub fn needs_fetch(&self) -> bool {
        match self {
            Lookup::Live(_) => false,
            Lookup::Fallback(status) => !matches!(
                status,
                ImageStatus::Updated | ImageStatus::Outdated | ImageStatus::Skipped
            ),
            Lookup::Miss => true,
        }
    }

    pub fn status(&self) -> Option<ImageStatus> {
        match self {
            Lookup::Live(status) | Lookup::Fallback(status) => Some(*status),
            Lookup::Miss => None,
        }
    }
}

pub struct StatusCache {
    live: TtlCache<String, ImageStatus>,
    fallback: TtlCache<String, ImageStatus>,
    aggregates: TtlCache<i64, ImageStatus>,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
}

impl StatusCache {
    /// `ttl` bounds the live tier and the stack aggregate entries
    pub fn new(ttl: Duration) -> Self {
        Self {
            live: TtlCache::new(Some(ttl)),
            fallback: TtlCache::permanent(),
            aggregates: TtlCache::new(Some(ttl)),
            last_refresh: RwLock::new(None),
        }
    }

    pub fn get(&self, container_id: &str) -> Option<ImageStatus> {
        self.live.get(&container_id.to_string())
    }

    pub fn set(&self, container_id: &str, status: ImageStatus) {
        self.live.set(container_id.to_string(), status);
    }

    pub fn set_with_ttl(&self, container_id: &str, status: ImageStatus, ttl: Duration) {
        self.live.set_with_ttl(container_id.to_string(), status, Some(ttl));
    }

    /// Record a last-known-good status; error and unrequested statuses are ignored
    pub fn set_fallback(&self, container_id: &str, status: ImageStatus) {
        if status.is_known_good() {
            self.fallback.set(container_id.to_string(), status);
        }
    }

    pub fn get_fallback(&self, container_id: &str) -> Option<ImageStatus> {
        self.fallback.get(&container_id.to_string())
    }

    /// Live tier first, then the fallback tier
    pub fn lookup(&self, container_id: &str) -> Lookup {
        if let Some(status) = self.get(container_id) {
            return Lookup::Live(status);
        }
        match self.get_fallback(container_id) {
            Some(status) => Lookup::Fallback(status),
            None => Lookup::Miss,
        }
    }

    /// Store the result of a successful live fetch in both tiers
    pub fn record(&self, container_id: &str, status: ImageStatus) {
        self.set(container_id, status);
        self.set_fallback(container_id, status);
    }

    /// Forget the live entry after a failed fetch; fallback data stays
    pub fn record_failure(&self, container_id: &str) {
        self.live.remove(&container_id.to_string());
    }

    /// Drop both tiers, for containers that no longer exist
    pub fn forget(&self, container_id: &str) {
        let key = container_id.to_string();
        self.live.remove(&key);
        self.fallback.remove(&key);
    }

    pub fn stack_status(&self, stack_id: i64) -> Option<ImageStatus> {
        self.aggregates.get(&stack_id)
    }

    pub fn set_stack_status(&self, stack_id: i64, status: ImageStatus) {
        if status.is_known_good() {
            self.aggregates.set(stack_id, status);
        }
    }

    /// Drop the aggregate entry so the next read for the stack goes upstream
    pub fn invalidate_stack(&self, stack_id: i64) {
        self.aggregates.remove(&stack_id);
    }

    pub fn mark_refreshed(&self, at: DateTime<Utc>) {
        let mut last = self.last_refresh.write().unwrap_or_else(|p| p.into_inner());
        *last = Some(at);
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.read().unwrap_or_else(|p| p.into_inner())
    }

    /// True when the last sweep finished less than `interval` before `now`
    pub fn refreshed_within(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_refresh() else {
            return false;
        };
        match chrono::Duration::from_std(interval) {
            Ok(interval) => now.signed_duration_since(last) < interval,
            Err(_) => true,
        }
    }

    /// Drop expired live and aggregate entries
    pub fn purge_expired(&self) -> usize {
        self.live.purge_expired() + self.aggregates.purge_expired()
    }

    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }
}

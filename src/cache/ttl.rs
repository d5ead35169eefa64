//! Internally synchronized map with per-entry expiry

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Key/value cache where every entry carries its own deadline.
///
/// `default_ttl` of `None` means entries never expire unless a TTL is given
/// explicitly. Expired entries are invisible to readers and dropped lazily.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    default_ttl: Option<Duration>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Cache whose entries live until removed
    pub fn permanent() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // a panic while holding the lock cannot leave a map half-written
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert with the cache's default TTL
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) {
        self.lock().insert(key, Entry::new(value, ttl));
    }

    /// Insert unless a live entry exists that `can_replace` refuses.
    ///
    /// Check and insert happen under one lock. Returns the blocking value on refusal.
    pub fn try_insert<F>(&self, key: K, value: V, ttl: Option<Duration>, can_replace: F) -> Result<(), V>
    where
        F: FnOnce(&V) -> bool,
    {
        let now = Instant::now();
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            if !existing.is_expired(now) && !can_replace(&existing.value) {
                return Err(existing.value.clone());
            }
        }
        entries.insert(key, Entry::new(value, ttl));
        Ok(())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Remove the entry only if its current value satisfies `predicate`
    pub fn remove_if<F>(&self, key: &K, predicate: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if predicate(&entry.value) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Copy of every live entry
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        self.lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Drop expired entries and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

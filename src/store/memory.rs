//! In-process ephemeral store.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::EphemeralStore;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A thread-safe map with per-entry expiry.
///
/// Expired entries are evicted lazily on `recall` and in bulk by
/// [`MemoryStore::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including ones that expired but were not evicted yet.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.inner.len())
    }
}

impl EphemeralStore for MemoryStore {
    fn remember(&self, key: &str, value: Value, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.inner.insert(key.to_string(), Entry { value, expires_at });
    }

    fn recall(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let live = self
            .inner
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()))?;
        if live.is_none() {
            self.inner.remove_if(key, |_, entry| !entry.is_live(now));
        }
        live
    }

    fn forget(&self, key: &str) {
        self.inner.remove(key);
    }
}

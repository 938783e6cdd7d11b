//! Injectable TTL cache for oracle responses.
//!
//! Staleness only affects simulated entry prices, never the ledger, so a
//! short TTL (tens of seconds) is acceptable. The cache is owned by the
//! orchestrator and passed in; it is not global state.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Thread-safe map with per-entry expiry.
pub struct TtlCache<K, V> {
    inner: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a live value; expired entries read as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.inner.read();
        let (expires_at, value) = guard.get(key)?;
        if Instant::now() < *expires_at {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut guard = self.inner.write();
        guard.insert(key, (Instant::now() + ttl, value));
    }

    /// Drop expired entries. Callers may invoke this periodically; `get`
    /// already ignores expired values.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.inner.write().retain(|_, (expires_at, _)| now < *expires_at);
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_entries_are_returned() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.set("a".to_string(), 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.set("a".to_string(), 1, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.evict_expired();
        assert!(cache.inner.read().is_empty());
    }
}

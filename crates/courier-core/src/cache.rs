//! Ephemeral TTL caching for connection-scoped state.

use std::{collections::HashMap, sync::RwLock, time::Duration};

use bytes::Bytes;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Key/value cache with per-entry time-to-live.
///
/// Expiry is evaluated at access time: a `get` after the entry's TTL has
/// elapsed is a miss and drops the entry. There is no eviction beyond TTL;
/// callers own the memory bound.
///
/// Values are returned by clone. Key-material callers store [`Bytes`] so a
/// read aliases the same buffer instead of copying it.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose `insert` uses `default_ttl`.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Insert with the cache's default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL, replacing any previous entry.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().unwrap().insert(key.into(), entry);
    }

    /// Look up a live entry; expired entries are removed and count as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: upgrade to a write lock and re-check before removing.
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Remove an entry if present.
    pub fn remove(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    /// Drop every entry, expired or not.
    pub fn flush_all(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Number of entries currently held, including not-yet-collected expired
    /// ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

const HOUR: Duration = Duration::from_secs(60 * 60);
const SESSION_KEY_TTL: Duration = Duration::from_secs(5 * 60);

/// Connection-scoped caches owned by the supervisor and shared with the
/// protocol engine by reference.
///
/// All of them are flushed together before every connection attempt, so no
/// state from a previous session leaks into the next one.
pub struct ConnectionCaches {
    /// Per-message retry counters the engine consults on redelivery.
    pub retry_counters: TtlCache<u32>,
    /// Serialized device lists per peer.
    pub device_lists: TtlCache<Bytes>,
    /// Envelopes pending a placeholder resend.
    pub placeholder_resends: TtlCache<Bytes>,
    /// Hot cache for key-material reads; short TTL, shared-buffer values.
    /// Arc'd so the cached key store can hold the same instance.
    pub session_keys: std::sync::Arc<TtlCache<Bytes>>,
}

impl Default for ConnectionCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionCaches {
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry_counters: TtlCache::new(HOUR),
            device_lists: TtlCache::new(HOUR),
            placeholder_resends: TtlCache::new(HOUR),
            session_keys: std::sync::Arc::new(TtlCache::new(SESSION_KEY_TTL)),
        }
    }

    /// Flush every cache. Idempotent; safe to call from any restart branch.
    pub fn flush_all(&self) {
        self.retry_counters.flush_all();
        self.device_lists.flush_all();
        self.placeholder_resends.flush_all();
        self.session_keys.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn get_within_ttl_hits() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.insert("k", 7u32);
        assert_eq!(cache.get("k"), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_ttl_misses() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.insert("k", 7u32);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), None);
        // The expired entry is collected by the miss.
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ttl_overrides_default() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.insert_with_ttl("k", 7u32, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k"), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_refreshes_expiry() {
        let cache = TtlCache::new(Duration::from_secs(2));
        cache.insert("k", 1u32);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("k", 2u32);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn bytes_reads_share_the_buffer() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let value = Bytes::from_static(b"key material");
        cache.insert("session", value.clone());

        let a = cache.get("session").unwrap();
        let b = cache.get("session").unwrap();
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(a.as_ptr(), value.as_ptr());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_all_clears_every_connection_cache() {
        let caches = ConnectionCaches::new();
        caches.retry_counters.insert("m1", 3);
        caches.session_keys.insert("s1", Bytes::from_static(b"x"));
        caches.flush_all();
        caches.flush_all(); // idempotent
        assert!(caches.retry_counters.is_empty());
        assert!(caches.session_keys.is_empty());
    }

    #[tokio::test]
    async fn remove_and_flush() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1u32);
        cache.insert("b", 2u32);
        cache.remove("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        cache.flush_all();
        assert!(cache.is_empty());
    }
}

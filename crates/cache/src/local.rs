//! In-process TTL cache backed by DashMap for lock-free concurrent access.
//! Staleness is pulled by the reader: an entry is checked against the
//! caller-supplied wall clock on every read, never pushed out by a timer.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
}

/// Whether an entry inserted at `inserted_at` has outlived `ttl` at `now`.
pub fn is_stale(inserted_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - inserted_at > ttl
}

/// Keyed cache of `(value, inserted_at, ttl)` entries.
pub struct TtlCache<K, V> {
    store: DashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: DashMap::new(),
            default_ttl,
            max_entries,
        }
    }

    /// Get a value, returns None if stale at `now` or missing.
    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let entry = self.store.get(key)?;
        if is_stale(entry.inserted_at, entry.ttl, now) {
            drop(entry);
            self.store.remove(key);
            metrics::counter!("cache.local.stale").increment(1);
            return None;
        }
        metrics::counter!("cache.local.hit").increment(1);
        Some(entry.value.clone())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Insert or replace a value with the default TTL.
    pub fn put_at(&self, key: K, value: V, now: DateTime<Utc>) {
        self.put_with_ttl(key, value, self.default_ttl, now);
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Utc::now());
    }

    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration, now: DateTime<Utc>) {
        // Over capacity: skip new keys, periodic eviction frees room.
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            return;
        }
        self.store.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.store.remove(key).is_some()
    }

    /// Remove entries stale at `now`. Call this periodically from a background task.
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| !is_stale(entry.inserted_at, entry.ttl, now));
        let evicted = before - self.store.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Local cache eviction complete");
        }
        evicted
    }

    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_is_stale_is_exclusive_at_ttl() {
        let ttl = Duration::seconds(60);
        assert!(!is_stale(t0(), ttl, t0() + Duration::seconds(60)));
        assert!(is_stale(t0(), ttl, t0() + Duration::seconds(61)));
    }

    #[test]
    fn test_get_respects_ttl() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::seconds(30), 10);
        cache.put_at("tiers", 3, t0());

        assert_eq!(cache.get_at(&"tiers", t0() + Duration::seconds(10)), Some(3));
        assert_eq!(cache.get_at(&"tiers", t0() + Duration::seconds(31)), None);
        // Stale read removes the entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_per_entry_ttl_and_eviction() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::seconds(30), 10);
        cache.put_at("a".into(), 1, t0());
        cache.put_with_ttl("b".into(), 2, Duration::seconds(300), t0());

        let evicted = cache.evict_expired_at(t0() + Duration::seconds(120));
        assert_eq!(evicted, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&"b".to_string(), t0() + Duration::seconds(120)), Some(2));
    }

    #[test]
    fn test_capacity_skips_new_keys() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::seconds(30), 1);
        cache.put_at(1, 1, t0());
        cache.put_at(2, 2, t0());
        cache.put_at(1, 10, t0());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&1, t0()), Some(10));
    }
}

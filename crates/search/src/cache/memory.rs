//! Bounded in-memory cache with LRU and TTL eviction

use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// One cached value and its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub created_at: Instant,
    pub accessed_at: Instant,
    pub access_count: u64,
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(data: V, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self { data, created_at: now, accessed_at: now, access_count: 0, expires_at: ttl.map(|ttl| now + ttl) }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Counters for one cache instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub total_accesses: u64,
    pub average_accesses: f64,
    pub ttl_secs: Option<u64>,
}

/// A string-keyed cache bounded by entry count (least recently used goes first) and by
/// absolute age
///
/// All operations take one mutex; they are O(max_size) at worst, never proportional to the
/// store behind the cache.
pub struct LruCache<V> {
    max_size: usize,
    default_ttl: Option<Duration>,
    entries: Mutex<::lru::LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> LruCache<V> {
    /// Create a cache holding at most `max_size` entries (at least one)
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self { max_size: capacity.get(), default_ttl, entries: Mutex::new(::lru::LruCache::new(capacity)) }
    }

    /// Look up `key`, refreshing its recency; expired entries are purged first
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        purge_expired(&mut entries, now);

        let entry = entries.get_mut(key)?;
        entry.accessed_at = now;
        entry.access_count += 1;
        Some(entry.data.clone())
    }

    /// Insert or replace `key`, expiring after `ttl` (or the cache default)
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, Instant::now());

        if !entries.contains(&key) {
            while entries.len() >= self.max_size {
                if entries.pop_lru().is_none() {
                    break;
                }
            }
        }

        entries.put(key, CacheEntry::new(value, ttl.or(self.default_ttl)));
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, Instant::now());
        entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, Instant::now());

        let size = entries.len();
        let total_accesses: u64 = entries.iter().map(|(_, entry)| entry.access_count).sum();
        let average_accesses = if size == 0 { 0.0 } else { total_accesses as f64 / size as f64 };

        CacheStats {
            size,
            max_size: self.max_size,
            total_accesses,
            average_accesses,
            ttl_secs: self.default_ttl.map(|ttl| ttl.as_secs()),
        }
    }

    #[cfg(test)]
    fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.lock().peek(key).cloned()
    }
}

fn purge_expired<V>(entries: &mut ::lru::LruCache<String, CacheEntry<V>>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();

    for key in expired {
        entries.pop(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let cache = LruCache::new(4, None);
        cache.set("a", 1, None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = LruCache::new(2, None);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = LruCache::new(2, None);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3, None);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_size_never_exceeds_max() {
        let cache = LruCache::new(3, None);
        for i in 0..20 {
            cache.set(format!("k{}", i % 7), i, None);
            assert!(cache.size() <= 3);
        }
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let cache = LruCache::new(2, None);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("b", 20, None);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), Some(20));
    }

    #[test]
    fn test_ttl_expiry_removes_entry() {
        let cache = LruCache::new(4, Some(Duration::from_millis(20)));
        cache.set("short", 1, None);
        cache.set("long", 2, Some(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("short"), None);
        assert!(cache.entry("short").is_none());
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_expired_entries_free_capacity() {
        let cache = LruCache::new(2, None);
        cache.set("old", 1, Some(Duration::from_millis(10)));
        cache.set("keep", 2, None);
        std::thread::sleep(Duration::from_millis(25));

        cache.set("new", 3, None);
        assert_eq!(cache.get("keep"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = LruCache::new(4, None);
        cache.set("a", 1, None);
        cache.set("b", 2, None);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.size(), 1);

        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_access_tracking_and_stats() {
        let cache = LruCache::new(4, Some(Duration::from_secs(600)));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.get("b");

        let entry = cache.entry("a").unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.accessed_at >= entry.created_at);

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 4);
        assert_eq!(stats.total_accesses, 4);
        assert!((stats.average_accesses - 2.0).abs() < f64::EPSILON);
        assert_eq!(stats.ttl_secs, Some(600));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = LruCache::new(0, None);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.max_size(), 1);
    }
}

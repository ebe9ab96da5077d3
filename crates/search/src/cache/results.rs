//! Memoized search results

use super::embedding::hex_digest;
use super::memory::{CacheStats, LruCache};
use crate::engine::SearchResult;

use pocket_core::SearchMode;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct QueryKey<'a> {
    store: String,
    mode: &'a str,
    text: String,
    tags: Vec<&'a str>,
    limit: usize,
}

/// Result lists keyed by the normalized query
pub struct SearchResultCache {
    cache: LruCache<Arc<Vec<SearchResult>>>,
    ttl: Duration,
}

impl SearchResultCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self { cache: LruCache::new(max_entries, Some(ttl)), ttl }
    }

    /// Key for a query against the store at `store`; case and surrounding whitespace of the text
    /// and the order of `tags` do not matter
    pub fn key(store: &Path, mode: SearchMode, text: &str, tags: &[String], limit: usize) -> String {
        let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let key = QueryKey {
            store: store.to_string_lossy().into_owned(),
            mode: mode.as_str(), text: text.trim().to_lowercase(),
            tags: sorted,
            limit,
        };
        let encoded = serde_json::to_vec(&key).unwrap_or_default();
        hex_digest(&encoded)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<SearchResult>>> {
        self.cache.get(key)
    }

    pub fn set(&self, key: impl Into<String>, results: Vec<SearchResult>) {
        self.cache.set(key, Arc::new(results), Some(self.ttl));
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

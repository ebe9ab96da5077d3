//! Loaded embedding indexes, reused until the store's embeddings change

use super::memory::{CacheStats, LruCache};

use pocket_store::EmbeddingFingerprint;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Every current embedding for one model, keyed by record id
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    pub fingerprint: EmbeddingFingerprint,
    pub vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn new(fingerprint: EmbeddingFingerprint, vectors: impl IntoIterator<Item = (String, Vec<f32>)>) -> Self {
        Self { fingerprint, vectors: vectors.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }
}

pub struct IndexCache {
    cache: LruCache<Arc<EmbeddingIndex>>,
    ttl: Duration,
}

impl IndexCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self { cache: LruCache::new(max_entries, Some(ttl)), ttl }
    }

    pub fn key(store_path: &Path, model: &str) -> String {
        format!("{}::{model}", store_path.display())
    }

    /// The cached index, only if it was built from the same set of embeddings
    pub fn get(&self, key: &str, fingerprint: &EmbeddingFingerprint) -> Option<Arc<EmbeddingIndex>> {
        self.cache.get(key).filter(|index| &index.fingerprint == fingerprint)
    }

    pub fn set(&self, key: impl Into<String>, index: Arc<EmbeddingIndex>) {
        self.cache.set(key, index, Some(self.ttl));
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.delete(key)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(count: u64) -> EmbeddingFingerprint {
        EmbeddingFingerprint { count, latest: Some("2026-01-01T00:00:00Z".to_string()) }
    }

    #[test]
    fn test_stale_fingerprint_misses() {
        let cache = IndexCache::new(2, Duration::from_secs(60));
        let key = IndexCache::key(Path::new("/tmp/pocket.db"), "hashing-384-v1");
        let index = EmbeddingIndex::new(fingerprint(1), vec![("a".to_string(), vec![1.0, 0.0])]);

        cache.set(key.clone(), Arc::new(index));
        assert!(cache.get(&key, &fingerprint(1)).is_some());
        assert!(cache.get(&key, &fingerprint(2)).is_none());

        assert!(cache.invalidate(&key));
        assert!(cache.get(&key, &fingerprint(1)).is_none());
    }

    #[test]
    fn test_index_lookup() {
        let index = EmbeddingIndex::new(fingerprint(2), vec![("a".to_string(), vec![1.0]), ("b".to_string(), vec![0.5])]);
        assert_eq!(index.len(), 2);
        assert!(!index.is_empty());
        assert_eq!(index.get("b"), Some(&[0.5][..]));
        assert_eq!(index.get("c"), None);
    }
}

//! Two-tier embedding cache keyed by model and text

use super::disk::DiskTier;
use super::memory::{CacheStats, LruCache};

use pocket_store::vector::{deserialize_embedding, serialize_embedding};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{trace, warn};

/// Memory and disk counters for the embedding cache
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingCacheStats {
    pub memory: CacheStats,
    pub disk_entries: Option<u64>,
    pub disk_bytes: Option<u64>,
}

/// Embeddings by `sha256("model:text")`; the memory tier fronts an optional disk tier and disk
/// hits are promoted back into memory
pub struct EmbeddingCache {
    memory: LruCache<Vec<f32>>,
    disk: Option<DiskTier>,
    memory_ttl: Duration,
    disk_ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize, memory_ttl: Duration, disk: Option<DiskTier>, disk_ttl: Duration) -> Self {
        Self { memory: LruCache::new(max_entries, Some(memory_ttl)), disk, memory_ttl, disk_ttl }
    }

    /// Memory-only cache, used when no persistent directory is configured
    pub fn in_memory(max_entries: usize, memory_ttl: Duration) -> Self {
        Self::new(max_entries, memory_ttl, None, Duration::ZERO)
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    pub fn key(model: &str, text: &str) -> String {
        hex_digest(format!("{model}:{text}").as_bytes())
    }

    pub async fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let key = Self::key(model, text);
        if let Some(embedding) = self.memory.get(&key) {
            trace!(key = %key, "Embedding cache hit (memory)");
            return Some(embedding);
        }

        let disk = self.disk.as_ref()?;
        match disk.get(&key).await {
            Ok(Some(bytes)) => {
                let embedding = deserialize_embedding(&bytes);
                if embedding.is_empty() {
                    return None;
                }
                trace!(key = %key, "Embedding cache hit (disk)");
                self.memory.set(key, embedding.clone(), Some(self.memory_ttl));
                Some(embedding)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Disk embedding cache read failed; treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, model: &str, text: &str, embedding: &[f32]) {
        let key = Self::key(model, text);
        self.memory.set(key.clone(), embedding.to_vec(), Some(self.memory_ttl));

        if let Some(disk) = &self.disk
            && let Err(e) = disk.set(&key, serialize_embedding(embedding), Some(self.disk_ttl)).await
        {
            warn!(error = %e, "Disk embedding cache write failed");
        }
    }

    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(disk) = &self.disk
            && let Err(e) = disk.clear().await
        {
            warn!(error = %e, "Failed to clear disk embedding cache");
        }
    }

    pub async fn stats(&self) -> EmbeddingCacheStats {
        let memory = self.memory.stats();
        let disk = match &self.disk {
            Some(disk) => match disk.stats().await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(error = %e, "Failed to read disk embedding cache stats");
                    None
                }
            },
            None => None,
        };

        EmbeddingCacheStats {
            memory,
            disk_entries: disk.as_ref().map(|stats| stats.entries),
            disk_bytes: disk.as_ref().map(|stats| stats.bytes),
        }
    }

    /// Drop expired rows from the disk tier
    pub async fn purge_expired(&self) -> usize {
        match &self.disk {
            Some(disk) => disk.purge_expired().await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to purge disk embedding cache");
                0
            }),
            None => 0,
        }
    }

    pub async fn close(self) {
        if let Some(disk) = self.disk
            && let Err(e) = disk.close().await
        {
            warn!(error = %e, "Failed to close disk embedding cache");
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_is_model_scoped() {
        let a = EmbeddingCache::key("model-a", "hello");
        let b = EmbeddingCache::key("model-b", "hello");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, EmbeddingCache::key("model-a", "hello"));
    }

    #[test]
    fn test_hex_digest_known_value() {
        assert_eq!(hex_digest(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[tokio::test]
    async fn test_memory_only_roundtrip() {
        let cache = EmbeddingCache::in_memory(8, Duration::from_secs(60));
        assert!(!cache.is_persistent());
        assert_eq!(cache.get("m", "text").await, None);

        cache.set("m", "text", &[0.5, -0.5]).await;
        assert_eq!(cache.get("m", "text").await, Some(vec![0.5, -0.5]));
        assert_eq!(cache.get("other", "text").await, None);
    }

    #[tokio::test]
    async fn test_disk_hit_is_promoted_to_memory() {
        let temp_dir = TempDir::new().unwrap();
        let disk = DiskTier::open(temp_dir.path()).await.unwrap();
        let cache = EmbeddingCache::new(8, Duration::from_secs(60), Some(disk), Duration::from_secs(3600));

        cache.set("m", "persisted text", &[1.0, 2.0, 3.0]).await;
        cache.memory.clear();
        assert_eq!(cache.memory.size(), 0);

        assert_eq!(cache.get("m", "persisted text").await, Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(cache.memory.size(), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.disk_entries, Some(1));
        assert_eq!(stats.disk_bytes, Some(12));

        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_clear_empties_both_tiers() {
        let temp_dir = TempDir::new().unwrap();
        let disk = DiskTier::open(temp_dir.path()).await.unwrap();
        let cache = EmbeddingCache::new(8, Duration::from_secs(60), Some(disk), Duration::from_secs(3600));

        cache.set("m", "a", &[1.0]).await;
        cache.clear().await;

        assert_eq!(cache.get("m", "a").await, None);
        assert_eq!(cache.stats().await.disk_entries, Some(0));

        let _ = temp_dir;
    }
}

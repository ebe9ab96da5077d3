//! Caches used by the search engine
//!
//! - [`EmbeddingCache`]: text embeddings, in memory with an optional on-disk tier
//! - [`SearchResultCache`]: final result lists per normalized query
//! - [`IndexCache`]: loaded embedding indexes per store and model
//!
//! All three sit on [`LruCache`], which bounds entries by count and by age.

mod disk;
mod embedding;
mod index;
mod memory;
mod results;

pub use disk::{DiskStats, DiskTier};
pub use embedding::{EmbeddingCache, EmbeddingCacheStats};
pub use index::{EmbeddingIndex, IndexCache};
pub use memory::{CacheEntry, CacheStats, LruCache};
pub use results::SearchResultCache;

use pocket_core::{CacheConfig, SearchConfig};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Which cache `CacheManager::clear` empties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    #[default]
    All,
    Embeddings,
    SearchResults,
    Index,
}

impl CacheScope {
    pub const VALUES: &[CacheScope] = &[CacheScope::All, CacheScope::Embeddings, CacheScope::SearchResults, CacheScope::Index];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheScope::All => "all",
            CacheScope::Embeddings => "embeddings",
            CacheScope::SearchResults => "search_results",
            CacheScope::Index => "index",
        }
    }
}

impl std::fmt::Display for CacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CacheScope {
    type Err = pocket_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase().replace('-', "_");
        CacheScope::VALUES
            .iter()
            .copied()
            .find(|scope| scope.as_str() == needle)
            .ok_or_else(|| pocket_core::Error::Config(format!("invalid cache scope: {s}")))
    }
}

/// Combined counters for every cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheManagerStats {
    pub embeddings: EmbeddingCacheStats,
    pub results: CacheStats,
    pub index: CacheStats,
}

/// Owns the engine's caches
pub struct CacheManager {
    pub embeddings: EmbeddingCache,
    pub results: SearchResultCache,
    pub index: IndexCache,
}

impl CacheManager {
    /// Build the caches; `disk_dir` enables the persistent embedding tier
    ///
    /// A disk tier that cannot be opened is logged and skipped, leaving the memory tier.
    pub async fn open(cache: &CacheConfig, search: &SearchConfig, disk_dir: Option<&Path>) -> Self {
        let disk = match disk_dir {
            Some(dir) => match DiskTier::open(dir).await {
                Ok(tier) => {
                    info!(path = %tier.path().display(), "Persistent embedding cache enabled");
                    Some(tier)
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Persistent embedding cache unavailable; using memory only");
                    None
                }
            },
            None => None,
        };

        let embeddings =
            EmbeddingCache::new(cache.embedding_max_entries, cache.embedding_ttl(), disk, cache.embedding_disk_ttl());
        if embeddings.is_persistent() {
            let purged = embeddings.purge_expired().await;
            if purged > 0 {
                info!(purged, "Purged expired persistent embeddings");
            }
        }

        Self {
            embeddings,
            results: SearchResultCache::new(cache.search_max_entries, search.cache_ttl()),
            index: IndexCache::new(cache.index_max_entries, cache.index_ttl()),
        }
    }

    /// Memory-only caches with the given settings
    pub fn in_memory(cache: &CacheConfig, search: &SearchConfig) -> Self {
        Self {
            embeddings: EmbeddingCache::in_memory(cache.embedding_max_entries, cache.embedding_ttl()),
            results: SearchResultCache::new(cache.search_max_entries, search.cache_ttl()),
            index: IndexCache::new(cache.index_max_entries, cache.index_ttl()),
        }
    }

    pub async fn clear(&self, scope: CacheScope) {
        match scope {
            CacheScope::All => {
                self.embeddings.clear().await;
                self.results.clear();
                self.index.clear();
            }
            CacheScope::Embeddings => self.embeddings.clear().await,
            CacheScope::SearchResults => self.results.clear(),
            CacheScope::Index => self.index.clear(),
        }
        info!(scope = %scope, "Cleared cache");
    }

    pub async fn stats(&self) -> CacheManagerStats {
        CacheManagerStats { embeddings: self.embeddings.stats().await, results: self.results.stats(), index: self.index.stats() }
    }

    pub async fn close(self) {
        self.embeddings.close().await;
    }
}

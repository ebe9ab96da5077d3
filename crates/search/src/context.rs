//! Explicitly constructed application context
//!
//! Built once at startup and passed to every consumer; `shutdown` tears the pieces down in
//! reverse order.

use crate::cache::CacheManager;
use crate::embedding::{EmbeddingGenerator, HashingEmbedder};
use crate::engine::HybridSearchEngine;
use crate::error::Result;

use pocket_core::Config;
use pocket_store::Store;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct PocketContext {
    pub config: Config,
    pub store: Store,
    pub caches: Arc<CacheManager>,
    pub engine: HybridSearchEngine,
}

impl PocketContext {
    /// Open the store, caches and engine with the default hashing generator
    pub async fn open(config: Config) -> Result<Self> {
        let generator = HashingEmbedder::with_model(
            config.search.embedding_model.clone(),
            config.search.embedding_dimension,
        );
        Self::open_with_generator(config, Arc::new(generator)).await
    }

    #[instrument(skip_all, fields(store = %config.store.path.display(), model = %generator.model_name()))]
    pub async fn open_with_generator(config: Config, generator: Arc<dyn EmbeddingGenerator>) -> Result<Self> {
        config.validate()?;

        let store = Store::open(&config.store, config.pool.clone()).await?;
        let disk_dir = config.cache.resolve_directory(store.path());
        let caches = Arc::new(CacheManager::open(&config.cache, &config.search, disk_dir.as_deref()).await);
        let engine = HybridSearchEngine::new(config.search.clone(), generator, caches.clone());

        info!(fts = store.fts_available(), "Pocket context ready");
        Ok(Self { config, store, caches, engine })
    }

    /// Stop the pool reaper, close pooled connections and the persistent cache tier
    pub async fn shutdown(self) {
        let Self { store, caches, engine, .. } = self;
        drop(engine);
        store.close().await;

        match Arc::try_unwrap(caches) {
            Ok(caches) => caches.close().await,
            Err(_) => warn!("Cache manager still shared at shutdown; leaving it to drop"),
        }
        info!("Pocket context shut down");
    }
}

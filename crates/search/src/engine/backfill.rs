//! Embedding backfill
//!
//! Embeds every record whose embedding is missing or belongs to another model. Batches run one
//! after another and each batch holds a pooled connection only for its own write transaction.

use super::HybridSearchEngine;
use crate::cache::IndexCache;
use crate::error::Result;

use pocket_store::{EmbeddingUpdate, Store};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Outcome of one backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Records that needed an embedding when the run started
    pub pending: usize,
    /// Records written
    pub embedded: usize,
    pub batches: usize,
    /// Records left pending because the generator could not embed them
    pub skipped: usize,
}

impl HybridSearchEngine {
    /// Embed all pending records in batches of `batch_size`
    ///
    /// Only one backfill runs at a time; a concurrent caller waits and then sees what is left.
    #[instrument(skip(self, store), fields(model = %self.embedder.model_name()))]
    pub async fn backfill_embeddings(&self, store: &Store, batch_size: usize) -> Result<BackfillReport> {
        let _guard = self.backfill_lock.lock().await;

        let model = self.embedder.model_name().to_string();
        let pending = store.pending_embeddings(&model).await?;
        let mut report = BackfillReport { pending: pending.len(), ..BackfillReport::default() };
        if pending.is_empty() {
            return Ok(report);
        }

        for chunk in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|item| item.text.clone()).collect();
            let embeddings = self.embedder.embed_batch_checked(&texts).await;

            let mut updates = Vec::with_capacity(chunk.len());
            for (item, embedding) in chunk.iter().zip(embeddings) {
                match embedding {
                    Some(embedding) => updates.push(EmbeddingUpdate { id: item.id.clone(), embedding }),
                    None => report.skipped += 1,
                }
            }

            if !updates.is_empty() {
                report.embedded += store.update_embeddings(updates, &model).await?;
            }
            report.batches += 1;
        }

        if report.embedded > 0 {
            self.caches.index.invalidate(&IndexCache::key(store.path(), &model));
        }
        if report.skipped > 0 {
            warn!(skipped = report.skipped, "Some records could not be embedded and remain pending");
        }

        info!(
            pending = report.pending,
            embedded = report.embedded,
            batches = report.batches,
            "Embedding backfill finished"
        );
        Ok(report)
    }

    /// Administrative backfill; `true` when nothing is left pending
    ///
    /// `batch_size` of `None` uses the configured `embedding_batch_size`.
    pub async fn ensure_embeddings(&self, store: &Store, batch_size: Option<usize>) -> Result<bool> {
        let batch_size = batch_size.unwrap_or(self.config.embedding_batch_size);
        let report = self.backfill_embeddings(store, batch_size).await?;
        Ok(report.skipped == 0)
    }
}

//! The three relevance signals
//!
//! Each signal borrows its own pooled connections through the store and returns scored records in
//! its own order; fusion decides the final ranking.

use super::{Signal, SignalHit};
use crate::cache::{CacheManager, EmbeddingIndex, IndexCache};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::fuzzy::{partial_ratio, token_set_ratio};

use pocket_core::SearchConfig;
use pocket_store::vector::{cosine_similarity, is_zero_vector};
use pocket_store::{Store, TextPredicate};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Divisor mapping FTS5 `bm25()` ranks onto roughly [0, 1]
///
/// Tied to the FTS5 rank scale; a different text index needs a different constant.
pub const FTS_RANK_SCALE: f64 = 10.0;

/// Everything a signal worker needs, owned so it can move into a task
#[derive(Clone)]
pub(crate) struct SignalContext {
    pub store: Store,
    pub embedder: Arc<Embedder>,
    pub caches: Arc<CacheManager>,
    pub config: Arc<SearchConfig>,
    pub text: Arc<str>,
    pub tags: Arc<[String]>,
}

impl SignalContext {
    pub(crate) async fn run(&self, signal: Signal) -> Result<Vec<SignalHit>> {
        match signal {
            Signal::Vector => self.vector().await,
            Signal::FullText => self.full_text().await,
            Signal::Fuzzy => self.fuzzy().await,
        }
    }

    #[instrument(skip(self), fields(top_k = self.config.vector_top_k))]
    async fn vector(&self) -> Result<Vec<SignalHit>> {
        let query = self.embedder.embed(&self.text).await;
        if is_zero_vector(&query) {
            debug!("Query embedding is empty; vector signal has nothing to compare");
            return Ok(Vec::new());
        }

        let index = self.load_index().await?;
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let threshold = self.config.vector_similarity_threshold;
        let candidates = self.store.scan(&self.tags, None).await?;
        let mut hits: Vec<SignalHit> = candidates
            .into_iter()
            .filter_map(|record| {
                let similarity = cosine_similarity(&query, index.get(&record.id)?);
                (similarity >= threshold).then_some(SignalHit { record, score: similarity })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.config.vector_top_k);
        debug!(hits = hits.len(), indexed = index.len(), "Vector signal finished");
        Ok(hits)
    }

    /// The cached index for the current model, rebuilt when the store's embeddings changed
    async fn load_index(&self) -> Result<Arc<EmbeddingIndex>> {
        let model = self.embedder.model_name();
        let fingerprint = self.store.embedding_fingerprint(model).await?;
        let key = IndexCache::key(self.store.path(), model);

        if let Some(index) = self.caches.index.get(&key, &fingerprint) {
            return Ok(index);
        }

        let vectors = self.store.embedding_vectors(model).await?;
        let index = Arc::new(EmbeddingIndex::new(fingerprint, vectors));
        debug!(model, vectors = index.len(), "Loaded embedding index");
        self.caches.index.set(key, index.clone());
        Ok(index)
    }

    #[instrument(skip(self), fields(native = self.store.fts_available()))]
    async fn full_text(&self) -> Result<Vec<SignalHit>> {
        let limit = self.config.max_results;

        if self.store.fts_available() {
            let hits = self.store.fts_search(&self.text, &self.tags, limit).await?;
            return Ok(hits
                .into_iter()
                .map(|hit| SignalHit { score: fts_rank_score(hit.rank), record: hit.record })
                .collect());
        }

        let query = self.text.to_lowercase();
        let mut hits: Vec<SignalHit> = self
            .store
            .find(&TextPredicate::AllTokens(self.text.to_string()), &self.tags, None)
            .await?
            .into_iter()
            .map(|record| {
                let score = f64::from(partial_ratio(&query, &record.text.to_lowercase())) / 100.0;
                SignalHit { record, score }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    #[instrument(skip(self), fields(threshold = self.config.fuzzy_score_threshold))]
    async fn fuzzy(&self) -> Result<Vec<SignalHit>> {
        let query = self.text.to_lowercase();
        let threshold = self.config.fuzzy_score_threshold;

        let mut hits: Vec<SignalHit> = self
            .store
            .scan(&self.tags, None)
            .await?
            .into_iter()
            .filter_map(|record| {
                let score = fuzzy_score(&query, &record.text.to_lowercase());
                (score >= threshold).then(|| SignalHit { record, score: f64::from(score) / 100.0 })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.config.max_results);
        Ok(hits)
    }
}

/// Map an FTS5 rank (negative, lower is better) with `clamp(1 + rank / scale, 0, 1)`
pub fn fts_rank_score(rank: f64) -> f64 {
    (1.0 + rank / FTS_RANK_SCALE).clamp(0.0, 1.0)
}

/// Better of partial ratio and token-set ratio, 0-100
pub fn fuzzy_score(query: &str, text: &str) -> u8 {
    partial_ratio(query, text).max(token_set_ratio(query, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_rank_score() {
        assert_eq!(fts_rank_score(0.0), 1.0);
        assert!((fts_rank_score(-2.5) - 0.75).abs() < 1e-12);
        assert_eq!(fts_rank_score(-15.0), 0.0);
        assert_eq!(fts_rank_score(3.0), 1.0);
    }

    #[test]
    fn test_fuzzy_score_takes_the_better_ratio() {
        assert_eq!(fuzzy_score("pool exhausted", "the connection pool exhausted its slots"), 100);
        assert_eq!(fuzzy_score("exhausted pool", "pool exhausted"), 100);
        assert!(fuzzy_score("zzzz", "connection pool") < 50);
    }
}

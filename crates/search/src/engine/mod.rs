//! Hybrid search engine
//!
//! A query runs `cache check → embedding backfill → signal fan-out → fusion → cache store`.
//! Predicate modes (`substr`, `glob`, `regex`, `exact`) and tag-only queries bypass the signals
//! and are answered by the store directly.

mod backfill;
mod fusion;
mod signals;

pub use backfill::BackfillReport;
pub use fusion::{fuse, rank_order, total_score};
pub use signals::{FTS_RANK_SCALE, fts_rank_score, fuzzy_score};

use crate::cache::{CacheManager, CacheManagerStats, CacheScope, SearchResultCache};
use crate::embedding::{Embedder, EmbeddingGenerator};
use crate::error::{Error, Result};
use signals::SignalContext;

use pocket_core::logging::truncate_for_log;
use pocket_core::{Record, SearchConfig, SearchMode, normalize_tags};
use pocket_store::{Store, TextPredicate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One independent relevance mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Signal {
    Vector,
    FullText,
    Fuzzy,
}

impl Signal {
    pub const ALL: &[Signal] = &[Signal::Vector, Signal::FullText, Signal::Fuzzy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Vector => "vector",
            Signal::FullText => "fts",
            Signal::Fuzzy => "fuzzy",
        }
    }

    /// Prefix of the match reason this signal contributes
    pub fn reason_label(&self) -> &'static str {
        match self {
            Signal::Vector => "Vector similarity",
            Signal::FullText => "Text match",
            Signal::Fuzzy => "Fuzzy match",
        }
    }

    /// Signals a mode runs, in fusion order
    pub fn for_mode(mode: SearchMode) -> Vec<Signal> {
        Signal::ALL
            .iter()
            .copied()
            .filter(|signal| match signal {
                Signal::Vector => mode.uses_vector(),
                Signal::FullText => mode.uses_fts(),
                Signal::Fuzzy => mode.uses_fuzzy(),
            })
            .collect()
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record scored by one signal
#[derive(Debug, Clone)]
pub struct SignalHit {
    pub record: Record,
    pub score: f64,
}

/// Everything one signal produced
#[derive(Debug, Clone)]
pub struct SignalHits {
    pub signal: Signal,
    pub hits: Vec<SignalHit>,
}

/// A ranked record with its per-signal scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub record_id: String,
    pub record: Record,
    pub vector_score: f64,
    pub fts_score: f64,
    pub fuzzy_score: f64,
    pub total_score: f64,
    pub match_reasons: Vec<String>,
}

impl SearchResult {
    /// Unscored result; the stored embedding is dropped from the record
    pub fn new(mut record: Record) -> Self {
        record.embedding = None;
        Self {
            record_id: record.id.clone(),
            record,
            vector_score: 0.0,
            fts_score: 0.0,
            fuzzy_score: 0.0,
            total_score: 0.0,
            match_reasons: Vec::new(),
        }
    }

    fn matched(record: Record, reason: String) -> Self {
        let mut result = Self::new(record);
        result.total_score = 1.0;
        result.match_reasons.push(reason);
        result
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub tags: Vec<String>,
    pub mode: SearchMode,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), tags: Vec::new(), mode: SearchMode::default(), limit: 10 }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Ranks records by fusing vector, full-text and fuzzy signals
///
/// The engine holds no per-query state; one instance serves concurrent queries against any
/// number of stores.
pub struct HybridSearchEngine {
    config: Arc<SearchConfig>,
    embedder: Arc<Embedder>,
    caches: Arc<CacheManager>,
    backfill_lock: Mutex<()>,
}

impl HybridSearchEngine {
    pub fn new(config: SearchConfig, generator: Arc<dyn EmbeddingGenerator>, caches: Arc<CacheManager>) -> Self {
        let embedder = Arc::new(Embedder::new(generator, caches.clone()));
        Self { config: Arc::new(config), embedder, caches, backfill_lock: Mutex::new(()) }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    /// Run a query and return at most `min(query.limit, max_results)` results, best first
    ///
    /// Pool exhaustion and an unreachable store fail the query. Any other signal failure only
    /// removes that signal's scores.
    #[instrument(
        skip(self, store, query),
        fields(query = %truncate_for_log(&query.text, 80), mode = %query.mode, limit = query.limit)
    )]
    pub async fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let limit = query.limit.min(self.config.max_results);
        let text = query.text.trim();
        let tags = normalize_tags(&query.tags);
        if limit == 0 || (text.is_empty() && tags.is_empty()) {
            return Ok(Vec::new());
        }

        let cache_key = self
            .config
            .enable_caching
            .then(|| SearchResultCache::key(store.path(), query.mode, text, &tags, limit));
        if let Some(key) = &cache_key
            && let Some(cached) = self.caches.results.get(key)
        {
            debug!(results = cached.len(), "Search result cache hit");
            return Ok(cached.iter().take(limit).cloned().collect());
        }

        let (results, complete) = if text.is_empty() {
            (self.tag_scan(store, &tags, limit).await?, true)
        } else if let Some(predicate) = text_predicate(query.mode, text) {
            (self.predicate_search(store, query.mode, &predicate, &tags, limit).await?, true)
        } else {
            self.signal_search(store, query.mode, text, tags, limit).await?
        };

        if complete && let Some(key) = cache_key {
            self.caches.results.set(key, results.clone());
        }

        info!(results = results.len(), "Search finished");
        Ok(results)
    }

    async fn tag_scan(&self, store: &Store, tags: &[String], limit: usize) -> Result<Vec<SearchResult>> {
        let records = store.scan(tags, Some(limit)).await?;
        Ok(records
            .into_iter()
            .map(|record| SearchResult::matched(record, "Tag match".to_string()))
            .collect())
    }

    async fn predicate_search(
        &self, store: &Store, mode: SearchMode, predicate: &TextPredicate, tags: &[String], limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let records = store.find(predicate, tags, Some(limit)).await?;
        Ok(records
            .into_iter()
            .map(|record| SearchResult::matched(record, format!("{mode} match")))
            .collect())
    }

    /// Backfill if needed, fan out the mode's signals and fuse; the flag is false when a signal
    /// failed, so the partial ranking is not cached
    async fn signal_search(
        &self, store: &Store, mode: SearchMode, text: &str, tags: Vec<String>, limit: usize,
    ) -> Result<(Vec<SearchResult>, bool)> {
        if mode.uses_vector()
            && let Err(e) = self.backfill_embeddings(store, self.config.embedding_batch_size).await
        {
            if e.is_operational() {
                return Err(e);
            }
            warn!(error = %e, "Embedding backfill failed; vector scores may be incomplete");
        }

        let context = SignalContext {
            store: store.clone(),
            embedder: self.embedder.clone(),
            caches: self.caches.clone(),
            config: self.config.clone(),
            text: Arc::from(text),
            tags: Arc::from(tags),
        };

        let signals = Signal::for_mode(mode);
        let outcomes = if self.config.parallel_search && signals.len() > 1 {
            self.run_parallel(&context, &signals).await
        } else {
            self.run_sequential(&context, &signals).await
        };

        let mut partials = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (signal, outcome) in outcomes {
            match outcome {
                Ok(hits) => {
                    debug!(signal = %signal, hits = hits.len(), "Signal finished");
                    partials.push(SignalHits { signal, hits });
                }
                Err(e) => {
                    warn!(signal = %signal, error = %e, "Signal failed; it contributes no scores");
                    failures.push(e);
                }
            }
        }

        if let Some(position) = failures.iter().position(Error::is_operational) {
            return Err(failures.swap_remove(position));
        }

        Ok((fuse(partials, &self.config, limit), failures.is_empty()))
    }

    /// One task per signal, all bounded by a shared deadline; late tasks are aborted
    async fn run_parallel(&self, context: &SignalContext, signals: &[Signal]) -> Vec<(Signal, Result<Vec<SignalHit>>)> {
        let timeout = self.config.signal_timeout();
        let deadline = Instant::now() + timeout;

        let handles: Vec<(Signal, JoinHandle<Result<Vec<SignalHit>>>)> = signals
            .iter()
            .map(|&signal| {
                let context = context.clone();
                (signal, tokio::spawn(async move { context.run(signal).await }))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (signal, mut handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(Error::Signal { signal: signal.as_str(), message: e.to_string() }),
                Err(_) => {
                    handle.abort();
                    Err(Error::SignalTimeout { signal: signal.as_str(), timeout })
                }
            };
            outcomes.push((signal, outcome));
        }
        outcomes
    }

    async fn run_sequential(&self, context: &SignalContext, signals: &[Signal]) -> Vec<(Signal, Result<Vec<SignalHit>>)> {
        let timeout: Duration = self.config.signal_timeout();
        let mut outcomes = Vec::with_capacity(signals.len());
        for &signal in signals {
            let outcome = match tokio::time::timeout(timeout, context.run(signal)).await {
                Ok(result) => result,
                Err(_) => Err(Error::SignalTimeout { signal: signal.as_str(), timeout }),
            };
            outcomes.push((signal, outcome));
        }
        outcomes
    }

    pub async fn clear_cache(&self, scope: CacheScope) {
        self.caches.clear(scope).await;
    }

    pub async fn cache_stats(&self) -> CacheManagerStats {
        self.caches.stats().await
    }
}

fn text_predicate(mode: SearchMode, text: &str) -> Option<TextPredicate> {
    let text = text.to_string();
    match mode {
        SearchMode::Substr => Some(TextPredicate::Substring(text)),
        SearchMode::Glob => Some(TextPredicate::Glob(text)),
        SearchMode::Regex => Some(TextPredicate::Regex(text)),
        SearchMode::Exact => Some(TextPredicate::Exact(text)),
        SearchMode::Fts | SearchMode::Vector | SearchMode::Fuzzy | SearchMode::Hybrid => None,
    }
}

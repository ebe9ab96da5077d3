//! Hybrid search over the pocket record store
//!
//! Combines three relevance signals into one ranking:
//!
//! - **Vector**: cosine similarity between the query embedding and stored record embeddings
//! - **Full text**: SQLite FTS5 rank, or a token-AND substring scan when FTS5 is unavailable
//! - **Fuzzy**: the better of partial-ratio and token-set-ratio string similarity
//!
//! `total = vector * w_v + fts * w_f + fuzzy * w_z`; results under `min_total_score` are dropped.
//!
//! # Example
//!
//! ```ignore
//! use pocket_core::{Config, SearchMode};
//! use pocket_search::{PocketContext, SearchQuery};
//!
//! let context = PocketContext::open(Config::load(None)?).await?;
//! let query = SearchQuery::new("connection pool").with_mode(SearchMode::Hybrid).with_limit(5);
//! for result in context.engine.search(&context.store, &query).await? {
//!     println!("{:.3} {}", result.total_score, result.record.text);
//! }
//! context.shutdown().await;
//! ```

pub mod cache;
mod context;
pub mod embedding;
pub mod engine;
mod error;
pub mod fuzzy;

pub use cache::{CacheManager, CacheManagerStats, CacheScope};
pub use context::PocketContext;
pub use embedding::{Embedder, EmbeddingGenerator, HashingEmbedder, preprocess_text};
pub use engine::{BackfillReport, HybridSearchEngine, SearchQuery, SearchResult, Signal};
pub use error::{Error, Result};

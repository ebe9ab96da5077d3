//! Record store on SQLite with a bounded connection pool
//!
//! Provides durable record storage, tag-filtered scans, text predicates, an optional FTS5
//! full-text capability (probed once at open), and embedding maintenance columns.
//!
//! # Example
//!
//! ```ignore
//! use pocket_core::{PoolConfig, Record, StoreConfig};
//! use pocket_store::{Store, TextPredicate};
//!
//! let store = Store::open(&StoreConfig::default(), PoolConfig::default()).await?;
//! store.insert(&Record::new("Use WAL mode for concurrent readers", ["sqlite"])).await?;
//!
//! let hits = store.find(&TextPredicate::Substring("wal".into()), &["sqlite".into()], Some(10)).await?;
//! for record in hits {
//!     println!("{}: {}", record.id, record.text);
//! }
//! store.close().await;
//! ```

mod error;
mod migration;
mod pool;
mod schema;
mod store;
pub mod vector;

pub use error::{Error, Result};
pub use migration::MigrationManager;
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use schema::SCHEMA_VERSION;
pub use store::{EmbeddingFingerprint, EmbeddingUpdate, FtsHit, PendingEmbedding, Store, TextPredicate};

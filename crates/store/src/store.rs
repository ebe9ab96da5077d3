//! Record store backed by pooled SQLite connections
//!
//! Provides record CRUD, tag-filtered scans, text predicates, the optional FTS5 match with
//! BM25 rank, and the embedding columns the search engine maintains.

use crate::error::{Error, Result};
use crate::migration::MigrationManager;
use crate::pool::{ConnectionPool, PoolStats};
use crate::vector::{deserialize_embedding, serialize_embedding};

use chrono::{DateTime, Utc};
use pocket_core::{PoolConfig, Record, StoreConfig, normalize_tags};
use regex::RegexBuilder;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

const RECORD_COLUMNS: &str =
    "records.id, records.created, records.text, records.tags, records.embedding, records.embedding_model, records.embedding_updated";

/// Text predicates served directly by SQL (or, for regex, by a filter over tag-matched rows)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPredicate {
    /// Case-insensitive substring
    Substring(String),
    /// Every whitespace-separated token appears as a case-insensitive substring
    AllTokens(String),
    /// SQLite GLOB pattern (case-sensitive)
    Glob(String),
    /// Whole text equals the value
    Exact(String),
    /// Case-insensitive regular expression
    Regex(String),
}

/// A full-text match with the engine's native BM25 rank (lower is better)
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub record: Record,
    pub rank: f64,
}

/// A record whose embedding is missing or was produced by another model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmbedding {
    pub id: String,
    pub text: String,
}

/// New embedding for one record
#[derive(Debug, Clone)]
pub struct EmbeddingUpdate {
    pub id: String,
    pub embedding: Vec<f32>,
}

/// Changes whenever the set of embeddings for a model changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EmbeddingFingerprint {
    pub count: u64,
    pub latest: Option<String>,
}

struct StoreInner {
    path: PathBuf,
    pool: ConnectionPool,
    fts_available: bool,
}

/// A handle to the record store; cheap to clone
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open or create the store, start its connection pool and probe for full-text support
    ///
    /// The probe runs once; the result is fixed for the lifetime of the handle.
    #[instrument(skip_all, fields(db_path = %config.path.display()))]
    pub async fn open(config: &StoreConfig, pool_config: PoolConfig) -> Result<Self> {
        info!("Opening record store at {}", config.path.display());

        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = ConnectionPool::open(&config.path, pool_config).await?;

        let fts_available = if config.full_text {
            let conn = pool.acquire().await?;
            conn.call(|conn| {
                MigrationManager::ensure_full_text(conn).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
            })
            .await?
        } else {
            debug!("Full-text index disabled by configuration");
            false
        };

        info!(fts_available, "Record store opened");
        Ok(Self { inner: Arc::new(StoreInner { path: config.path.clone(), pool, fts_available }) })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Whether native full-text matching is usable on this store
    pub fn fts_available(&self) -> bool {
        self.inner.fts_available
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Stop the pool reaper and close idle connections
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    /// Insert a record (tags are normalized on the way in)
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn insert(&self, record: &Record) -> Result<()> {
        let id = record.id.clone();
        let created = record.created;
        let text = record.text.clone();
        let tags = serde_json::to_string(&normalize_tags(&record.tags))?;
        let embedding = record.embedding.as_deref().map(serialize_embedding);
        let embedding_model = record.embedding_model.clone();
        let embedding_updated = record.embedding_updated;

        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| {
            conn.execute(
                r#"
                INSERT INTO records (id, created, text, tags, embedding, embedding_model, embedding_updated)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![id, created, text, tags, embedding, embedding_model, embedding_updated],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await?;

        trace!("Record inserted");
        Ok(())
    }

    /// Point lookup by id, including embedding fields
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        let id = id.to_owned();
        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| {
            let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE records.id = ?1");
            conn.query_row(&sql, params![id], |row| record_from_row(row, true))
                .optional()
        })
        .await
    }

    /// Delete a record; returns whether it existed
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let id = id.to_owned();
        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| Ok(conn.execute("DELETE FROM records WHERE id = ?1", params![id])? > 0))
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        let conn = self.inner.pool.acquire().await?;
        conn.call(|conn| conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|count| count.max(0) as u64)
    }

    /// Records carrying all of `tags`, most recent first
    #[instrument(skip(self, tags), fields(tags = tags.len()))]
    pub async fn scan(&self, tags: &[String], limit: Option<usize>) -> Result<Vec<Record>> {
        let mut query = RecordQuery::new(tags);
        query.limit = limit;
        self.run_query(query).await
    }

    /// Records matching a text predicate and carrying all of `tags`, most recent first
    #[instrument(skip(self, predicate, tags), fields(tags = tags.len()))]
    pub async fn find(&self, predicate: &TextPredicate, tags: &[String], limit: Option<usize>) -> Result<Vec<Record>> {
        let mut query = RecordQuery::new(tags);

        match predicate {
            TextPredicate::Substring(needle) => {
                query.clauses.push("instr(lower(records.text), lower(?)) > 0".to_string());
                query.params.push(Value::Text(needle.clone()));
            }
            TextPredicate::AllTokens(text) => {
                for token in text.split_whitespace() {
                    query.clauses.push("instr(lower(records.text), lower(?)) > 0".to_string());
                    query.params.push(Value::Text(token.to_string()));
                }
            }
            TextPredicate::Glob(pattern) => {
                query.clauses.push("records.text GLOB ?".to_string());
                query.params.push(Value::Text(pattern.clone()));
            }
            TextPredicate::Exact(value) => {
                query.clauses.push("records.text = ?".to_string());
                query.params.push(Value::Text(value.clone()));
            }
            TextPredicate::Regex(pattern) => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::invalid_query(format!("invalid regex '{pattern}': {e}")))?;

                let mut records = self.run_query(query).await?;
                records.retain(|record| regex.is_match(&record.text));
                if let Some(limit) = limit {
                    records.truncate(limit);
                }
                return Ok(records);
            }
        }

        query.limit = limit;
        self.run_query(query).await
    }

    /// Native full-text match ranked by BM25
    ///
    /// Every query token must match. Fails with [`Error::InvalidQuery`] when the store has no
    /// full-text index; callers check [`Store::fts_available`] first.
    #[instrument(skip(self, query, tags), fields(tags = tags.len()))]
    pub async fn fts_search(&self, query: &str, tags: &[String], limit: usize) -> Result<Vec<FtsHit>> {
        if !self.inner.fts_available {
            return Err(Error::invalid_query("full-text index is not available on this store"));
        }

        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut filter = RecordQuery::new(tags);
        let mut params = vec![Value::Text(match_expr)];
        params.append(&mut filter.params);
        params.push(Value::Integer(limit as i64));

        let mut sql = format!(
            "SELECT {RECORD_COLUMNS}, bm25(records_fts) AS rank
             FROM records_fts JOIN records ON records.rowid = records_fts.rowid
             WHERE records_fts MATCH ?"
        );
        for clause in &filter.clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY rank, records.created DESC LIMIT ?");

        let conn = self.inner.pool.acquire().await?;
        let hits = conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(params), |row| {
                    Ok(FtsHit { record: record_from_row(row, false)?, rank: row.get(7)? })
                })?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            })
            .await?;

        trace!(count = hits.len(), "Full-text search complete");
        Ok(hits)
    }

    /// Records with no embedding, or one produced by a model other than `model`, newest first
    #[instrument(skip(self))]
    pub async fn pending_embeddings(&self, model: &str) -> Result<Vec<PendingEmbedding>> {
        let model = model.to_owned();
        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, text FROM records
                WHERE embedding IS NULL
                   OR embedding_updated IS NULL
                   OR embedding_model IS NULL
                   OR embedding_model != ?1
                ORDER BY created DESC, id ASC
                "#,
            )?;
            let rows = stmt.query_map(params![model], |row| {
                Ok(PendingEmbedding { id: row.get(0)?, text: row.get(1)? })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await
    }

    /// Write a batch of embeddings in one transaction; returns the number of rows updated
    #[instrument(skip(self, updates), fields(batch = updates.len()))]
    pub async fn update_embeddings(&self, updates: Vec<EmbeddingUpdate>, model: &str) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let model = model.to_owned();
        let now: DateTime<Utc> = Utc::now();
        let conn = self.inner.pool.acquire().await?;
        let updated = conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut updated = 0;
                {
                    let mut stmt = tx.prepare_cached(
                        "UPDATE records SET embedding = ?1, embedding_model = ?2, embedding_updated = ?3 WHERE id = ?4",
                    )?;
                    for update in &updates {
                        let blob = serialize_embedding(&update.embedding);
                        updated += stmt.execute(params![blob, model, now, update.id])?;
                    }
                }
                tx.commit()?;
                Ok::<_, rusqlite::Error>(updated)
            })
            .await?;

        debug!(updated, "Embeddings updated");
        Ok(updated)
    }

    /// All stored embeddings produced by `model`
    #[instrument(skip(self))]
    pub async fn embedding_vectors(&self, model: &str) -> Result<Vec<(String, Vec<f32>)>> {
        let model = model.to_owned();
        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, embedding FROM records WHERE embedding IS NOT NULL AND embedding_model = ?1",
            )?;
            let rows = stmt.query_map(params![model], |row| {
                let blob: Vec<u8> = row.get(1)?;
                Ok((row.get::<_, String>(0)?, deserialize_embedding(&blob)))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await
    }

    /// Cheap summary of the embeddings for `model`, used to validate cached index snapshots
    pub async fn embedding_fingerprint(&self, model: &str) -> Result<EmbeddingFingerprint> {
        let model = model.to_owned();
        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*), MAX(embedding_updated) FROM records WHERE embedding IS NOT NULL AND embedding_model = ?1",
                params![model],
                |row| {
                    Ok(EmbeddingFingerprint {
                        count: row.get::<_, i64>(0)?.max(0) as u64,
                        latest: row.get(1)?,
                    })
                },
            )
        })
        .await
    }

    async fn run_query(&self, query: RecordQuery) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records");
        if !query.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&query.clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY records.created DESC, records.id ASC");

        let mut params = query.params;
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }

        let conn = self.inner.pool.acquire().await?;
        conn.call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params), |row| record_from_row(row, false))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await
    }
}

/// WHERE clauses and positional parameters over the `records` table
struct RecordQuery {
    clauses: Vec<String>,
    params: Vec<Value>,
    limit: Option<usize>,
}

impl RecordQuery {
    fn new(tags: &[String]) -> Self {
        let mut query = Self { clauses: Vec::new(), params: Vec::new(), limit: None };
        for tag in normalize_tags(tags) {
            query
                .clauses
                .push("EXISTS (SELECT 1 FROM json_each(records.tags) WHERE json_each.value = ?)".to_string());
            query.params.push(Value::Text(tag));
        }
        query
    }
}

/// Quote each token so FTS5 syntax characters in user input are matched literally
fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() { None } else { Some(terms.join(" ")) }
}

fn record_from_row(row: &Row<'_>, with_embedding: bool) -> rusqlite::Result<Record> {
    let tags_json: String = row.get(3)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    let embedding = if with_embedding {
        row.get::<_, Option<Vec<u8>>>(4)?.map(|blob| deserialize_embedding(&blob))
    } else {
        None
    };

    Ok(Record {
        id: row.get(0)?,
        created: row.get(1)?,
        text: row.get(2)?,
        tags,
        embedding,
        embedding_model: row.get(5)?,
        embedding_updated: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn store_config(temp_dir: &TempDir, full_text: bool) -> StoreConfig {
        StoreConfig { path: temp_dir.path().join("records.db"), full_text }
    }

    fn pool_config() -> PoolConfig {
        PoolConfig { min_connections: 1, max_connections: 4, connection_timeout_ms: 5_000, ..PoolConfig::default() }
    }

    async fn open_store(temp_dir: &TempDir, full_text: bool) -> Store {
        Store::open(&store_config(temp_dir, full_text), pool_config()).await.unwrap()
    }

    /// Insert records with strictly increasing `created` so ordering is deterministic
    async fn seed(store: &Store, items: &[(&str, &str, &[&str])]) {
        let base = Utc::now() - ChronoDuration::hours(1);
        for (i, (id, text, tags)) in items.iter().enumerate() {
            let mut record = Record::with_id(*id, *text, tags.iter());
            record.created = base + ChronoDuration::seconds(i as i64);
            store.insert(&record).await.unwrap();
        }
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_store_open() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, true).await;
        assert!(store.fts_available());
        assert_eq!(store.count().await.unwrap(), 0);
        store.close().await;
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig { path: temp_dir.path().join("nested/dir/records.db"), full_text: false };
        let store = Store::open(&config, pool_config()).await.unwrap();
        assert!(config.path.exists());
        assert!(!store.fts_available());
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, true).await;

        let record = Record::with_id("r1", "The quick brown fox", ["Animals", "quick facts"]);
        store.insert(&record).await.unwrap();

        let fetched = store.get("r1").await.unwrap().unwrap();
        assert_eq!(fetched.text, "The quick brown fox");
        assert_eq!(fetched.tags, vec!["animals".to_string(), "quick-facts".to_string()]);
        assert_eq!(fetched.created, record.created);
        assert!(fetched.embedding.is_none());

        assert!(store.get("missing").await.unwrap().is_none());
        assert!(store.remove("r1").await.unwrap());
        assert!(!store.remove("r1").await.unwrap());
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, false).await;

        store.insert(&Record::with_id("r1", "one", ["a"])).await.unwrap();
        assert!(store.insert(&Record::with_id("r1", "two", ["a"])).await.is_err());
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_scan_filters_by_all_tags() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, false).await;
        seed(
            &store,
            &[
                ("a", "first", &["rust", "async"]),
                ("b", "second", &["rust"]),
                ("c", "third", &["python", "async"]),
            ],
        )
        .await;

        let all = store.scan(&[], None).await.unwrap();
        assert_eq!(ids(&all), vec!["c", "b", "a"]);

        let rust = store.scan(&["Rust".to_string()], None).await.unwrap();
        assert_eq!(ids(&rust), vec!["b", "a"]);

        let both = store.scan(&["rust".to_string(), "async".to_string()], None).await.unwrap();
        assert_eq!(ids(&both), vec!["a"]);

        let limited = store.scan(&[], Some(1)).await.unwrap();
        assert_eq!(ids(&limited), vec!["c"]);
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_find_predicates() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, false).await;
        seed(
            &store,
            &[
                ("a", "Deploy the service with cargo", &["ops"]),
                ("b", "cargo test runs the suite", &["dev"]),
                ("c", "exact phrase", &["dev"]),
            ],
        )
        .await;

        let substr = store.find(&TextPredicate::Substring("CARGO".into()), &[], None).await.unwrap();
        assert_eq!(ids(&substr), vec!["b", "a"]);

        let tokens = store.find(&TextPredicate::AllTokens("the cargo".into()), &[], None).await.unwrap();
        assert_eq!(ids(&tokens), vec!["b", "a"]);

        let tokens = store.find(&TextPredicate::AllTokens("deploy cargo".into()), &[], None).await.unwrap();
        assert_eq!(ids(&tokens), vec!["a"]);

        let glob = store.find(&TextPredicate::Glob("cargo *".into()), &[], None).await.unwrap();
        assert_eq!(ids(&glob), vec!["b"]);

        let exact = store.find(&TextPredicate::Exact("exact phrase".into()), &[], None).await.unwrap();
        assert_eq!(ids(&exact), vec!["c"]);

        let tagged = store.find(&TextPredicate::Substring("cargo".into()), &["ops".into()], None).await.unwrap();
        assert_eq!(ids(&tagged), vec!["a"]);
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_find_regex_applies_limit_after_filter() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, false).await;
        seed(
            &store,
            &[
                ("a", "Error: disk full", &[]),
                ("b", "all good", &[]),
                ("c", "error: timeout", &[]),
                ("d", "still fine", &[]),
            ],
        )
        .await;

        let hits = store.find(&TextPredicate::Regex("^error:".into()), &[], Some(1)).await.unwrap();
        assert_eq!(ids(&hits), vec!["c"]);

        let hits = store.find(&TextPredicate::Regex("^error:".into()), &[], None).await.unwrap();
        assert_eq!(ids(&hits), vec!["c", "a"]);

        let err = store.find(&TextPredicate::Regex("(unclosed".into()), &[], None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_fts_search_ranks_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, true).await;
        seed(
            &store,
            &[
                ("a", "rust ownership and borrowing explained", &["rust"]),
                ("b", "borrowing money from the bank", &["finance"]),
                ("c", "rust borrowing rust borrowing rust borrowing", &["rust"]),
            ],
        )
        .await;

        let hits = store.fts_search("borrowing", &[], 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].rank <= pair[1].rank);
        }

        let rust_only = store.fts_search("borrowing", &["rust".to_string()], 10).await.unwrap();
        assert_eq!(rust_only.len(), 2);
        assert!(rust_only.iter().all(|hit| hit.record.tags.contains(&"rust".to_string())));

        let both_terms = store.fts_search("rust bank", &[], 10).await.unwrap();
        assert!(both_terms.is_empty());

        assert!(store.fts_search("   ", &[], 10).await.unwrap().is_empty());
        assert_eq!(store.fts_search("borrowing\" OR", &[], 10).await.unwrap().len(), 0);
        assert_eq!(store.fts_search("borrowing\"", &[], 10).await.unwrap().len(), 3);
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_fts_search_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, false).await;
        let err = store.fts_search("anything", &[], 10).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_embedding_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir, true).await;
        seed(&store, &[("a", "alpha", &[]), ("b", "beta", &[])]).await;

        let pending = store.pending_embeddings("m1").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "b");
        assert_eq!(store.embedding_fingerprint("m1").await.unwrap(), EmbeddingFingerprint::default());

        let updates = vec![
            EmbeddingUpdate { id: "a".to_string(), embedding: vec![1.0, 0.0] },
            EmbeddingUpdate { id: "b".to_string(), embedding: vec![0.0, 1.0] },
            EmbeddingUpdate { id: "gone".to_string(), embedding: vec![0.5, 0.5] },
        ];
        assert_eq!(store.update_embeddings(updates, "m1").await.unwrap(), 2);

        assert!(store.pending_embeddings("m1").await.unwrap().is_empty());
        assert_eq!(store.pending_embeddings("m2").await.unwrap().len(), 2);

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.embedding, Some(vec![1.0, 0.0]));
        assert!(record.has_current_embedding("m1"));

        let mut vectors = store.embedding_vectors("m1").await.unwrap();
        vectors.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(vectors, vec![("a".to_string(), vec![1.0, 0.0]), ("b".to_string(), vec![0.0, 1.0])]);
        assert!(store.embedding_vectors("m2").await.unwrap().is_empty());

        let fingerprint = store.embedding_fingerprint("m1").await.unwrap();
        assert_eq!(fingerprint.count, 2);
        assert!(fingerprint.latest.is_some());

        let hits = store.fts_search("alpha", &[], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        let _ = temp_dir;
    }

    #[test]
    fn test_fts_match_expression() {
        assert_eq!(fts_match_expression("rust async").as_deref(), Some("\"rust\" \"async\""));
        assert_eq!(fts_match_expression("say \"hi\"").as_deref(), Some("\"say\" \"\"\"hi\"\"\""));
        assert_eq!(fts_match_expression("  "), None);
    }
}

//! Persistent cache tier in a small SQLite file next to the store
//!
//! Failures here never fail a lookup: callers treat them as misses and log a warning.

use crate::error::{Error, Result};

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_rusqlite::Connection;
use tracing::{debug, instrument};

const DISK_CACHE_FILE: &str = "embeddings.db";

const DISK_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
"#;

/// Entry count and payload size of the disk tier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskStats {
    pub entries: u64,
    pub bytes: u64,
}

/// Key/blob store with per-entry expiry
pub struct DiskTier {
    path: PathBuf,
    conn: Connection,
}

impl DiskTier {
    /// Open (creating if needed) the cache file inside `dir`
    #[instrument(skip(dir), fields(dir = %dir.display()))]
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(DISK_CACHE_FILE);

        let conn = Connection::open(&path).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(DISK_SCHEMA_SQL)?;
            Ok::<_, rusqlite::Error>(())
        })
        .await?;

        debug!(path = %path.display(), "Opened disk cache tier");
        Ok(Self { path, conn })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch a live entry; expired entries read as missing
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_owned();
        let now = now_millis();

        let value = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT value FROM cache_entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                )?;
                let value = stmt.query_row(params![key, now], |row| row.get::<_, Vec<u8>>(0)).optional()?;
                Ok::<_, rusqlite::Error>(value)
            })
            .await?;

        Ok(value)
    }

    /// Insert or replace an entry that expires after `ttl`
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let key = key.to_owned();
        let now = now_millis();
        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.as_millis() as i64));

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r#"
                    INSERT INTO cache_entries (key, value, created_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT (key) DO UPDATE SET
                        value = excluded.value,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at
                    "#,
                )?;
                stmt.execute(params![key, value, now, expires_at])?;
                Ok::<_, rusqlite::Error>(())
            })
            .await?;

        Ok(())
    }

    /// Remove expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = now_millis();
        let removed = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )
            })
            .await?;

        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        self.conn
            .call(|conn| conn.execute("DELETE FROM cache_entries", []))
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<DiskStats> {
        let now = now_millis();
        let stats = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    r#"
                    SELECT COUNT(*), COALESCE(SUM(LENGTH(value)), 0)
                    FROM cache_entries
                    WHERE expires_at IS NULL OR expires_at > ?1
                    "#,
                    params![now],
                    |row| Ok(DiskStats { entries: row.get::<_, i64>(0)? as u64, bytes: row.get::<_, i64>(1)? as u64 }),
                )
            })
            .await?;

        Ok(stats)
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(|e| Error::cache(format!("Failed to close disk cache: {e}")))
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_directory_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("cache");

        let tier = DiskTier::open(&dir).await.unwrap();
        assert!(tier.path().exists());
        assert_eq!(tier.path(), dir.join(DISK_CACHE_FILE));

        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_set_get_and_replace() {
        let temp_dir = TempDir::new().unwrap();
        let tier = DiskTier::open(temp_dir.path()).await.unwrap();

        assert_eq!(tier.get("k").await.unwrap(), None);

        tier.set("k", vec![1, 2, 3], None).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap(), Some(vec![1, 2, 3]));

        tier.set("k", vec![9], Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap(), Some(vec![9]));

        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let temp_dir = TempDir::new().unwrap();
        let tier = DiskTier::open(temp_dir.path()).await.unwrap();

        tier.set("short", vec![1], Some(Duration::from_millis(10))).await.unwrap();
        tier.set("long", vec![2], Some(Duration::from_secs(60))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(tier.get("short").await.unwrap(), None);
        assert_eq!(tier.stats().await.unwrap().entries, 1);
        assert_eq!(tier.purge_expired().await.unwrap(), 1);
        assert_eq!(tier.get("long").await.unwrap(), Some(vec![2]));

        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        let tier = DiskTier::open(temp_dir.path()).await.unwrap();
        tier.set("persisted", vec![7, 7], None).await.unwrap();
        tier.close().await.unwrap();

        let tier = DiskTier::open(temp_dir.path()).await.unwrap();
        assert_eq!(tier.get("persisted").await.unwrap(), Some(vec![7, 7]));

        let _ = temp_dir;
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let tier = DiskTier::open(temp_dir.path()).await.unwrap();

        tier.set("a", vec![0; 8], None).await.unwrap();
        tier.set("b", vec![0; 4], None).await.unwrap();
        assert_eq!(tier.stats().await.unwrap(), DiskStats { entries: 2, bytes: 12 });

        tier.clear().await.unwrap();
        assert_eq!(tier.stats().await.unwrap(), DiskStats::default());

        let _ = temp_dir;
    }
}

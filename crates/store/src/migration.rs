//! Schema migration logic for the record store
//!
//! Tracks applied migrations and applies pending ones up to the current schema version.
//! Runs on every freshly opened pooled connection, so it must stay idempotent and cheap.

use crate::error::{Error, Result};
use crate::schema::{FTS_REBUILD_SQL, FTS_TRIGGERS_SQL, RECORDS_FTS_SQL, RECORDS_SQL, SCHEMA_VERSION, SCHEMA_VERSION_SQL};
use rusqlite::Connection;
use tracing::{debug, info, trace, warn};

/// Manages schema migrations for the record store
pub struct MigrationManager;

impl MigrationManager {
    /// Get the current schema version from the database
    ///
    /// Returns 0 if the schema_version table doesn't exist or is empty.
    pub fn get_current_version(conn: &Connection) -> Result<i32> {
        let table_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(format!("Failed to check schema_version table: {e}")))?;

        if !table_exists {
            trace!("schema_version table does not exist, returning version 0");
            return Ok(0);
        }

        let version: Option<i32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Failed to query schema version: {e}")))?;

        Ok(version.unwrap_or(0))
    }

    /// Apply pending migrations up to SCHEMA_VERSION
    pub fn migrate(conn: &Connection) -> Result<()> {
        let current_version = Self::get_current_version(conn)?;
        trace!(current_version, target = SCHEMA_VERSION, "Checking schema version");

        if current_version >= SCHEMA_VERSION {
            return Ok(());
        }

        info!("Migrating schema from version {} to {}", current_version, SCHEMA_VERSION);

        if current_version == 0 {
            Self::apply_v1_migration(conn)?;
        }

        info!("Schema migration complete");
        Ok(())
    }

    fn apply_v1_migration(conn: &Connection) -> Result<()> {
        debug!("Applying v1 migration");

        let sql = format!(
            "BEGIN;\n{SCHEMA_VERSION_SQL}\n{RECORDS_SQL}\nINSERT OR IGNORE INTO schema_version (version) VALUES (1);\nCOMMIT;"
        );
        conn.execute_batch(&sql)
            .map_err(|e| Error::database(format!("Failed to apply v1 schema: {e}")))?;

        trace!("v1 migration applied successfully");
        Ok(())
    }

    /// Create the FTS5 index and its triggers if SQLite supports them
    ///
    /// Returns whether the index is usable. A missing FTS5 module is not an error.
    pub fn ensure_full_text(conn: &Connection) -> Result<bool> {
        let existed: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='records_fts')",
            [],
            |row| row.get(0),
        )?;

        if let Err(e) = conn.execute_batch(RECORDS_FTS_SQL) {
            warn!("Full-text index unavailable, falling back to substring matching: {e}");
            return Ok(false);
        }

        conn.execute_batch(FTS_TRIGGERS_SQL)
            .map_err(|e| Error::database(format!("Failed to create full-text triggers: {e}")))?;

        if !existed {
            debug!("Building full-text index over existing records");
            conn.execute(FTS_REBUILD_SQL, [])?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_get_current_version_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let version = MigrationManager::get_current_version(&conn).unwrap();
        assert_eq!(version, 0);
    }

    #[test]
    fn test_migrate_applies_schema_and_sets_version() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&conn).unwrap();

        let version = MigrationManager::get_current_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let table_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='records')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(table_exists);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        MigrationManager::migrate(&conn).unwrap();
        MigrationManager::migrate(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(MigrationManager::get_current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_ensure_full_text_indexes_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO records (id, created, text, tags) VALUES ('r1', '2024-01-01', 'quick brown fox', '[]')",
            [],
        )
        .unwrap();

        assert!(MigrationManager::ensure_full_text(&conn).unwrap());
        assert!(MigrationManager::ensure_full_text(&conn).unwrap());

        let hits: i64 = conn
            .query_row("SELECT COUNT(*) FROM records_fts WHERE records_fts MATCH 'fox'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_full_text_triggers_follow_text_updates() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::migrate(&conn).unwrap();
        MigrationManager::ensure_full_text(&conn).unwrap();

        conn.execute(
            "INSERT INTO records (id, created, text, tags) VALUES ('r1', '2024-01-01', 'alpha', '[]')",
            [],
        )
        .unwrap();
        conn.execute("UPDATE records SET text = 'beta' WHERE id = 'r1'", []).unwrap();

        let count = |term: &str| -> i64 {
            conn.query_row("SELECT COUNT(*) FROM records_fts WHERE records_fts MATCH ?1", [term], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count("alpha"), 0);
        assert_eq!(count("beta"), 1);

        conn.execute("DELETE FROM records WHERE id = 'r1'", []).unwrap();
        assert_eq!(count("beta"), 0);
    }
}

//! SQLite schema for the record store
//!
//! The full-text index is kept separate from the base schema: it is created only when the
//! store is opened with full-text enabled and SQLite provides FTS5.

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create the schema version table
pub const SCHEMA_VERSION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQL to create the records table
///
/// `tags` holds a JSON array of normalized tags. `embedding` is a little-endian f32 blob.
pub const RECORDS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    created TEXT NOT NULL,
    text TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    embedding_model TEXT,
    embedding_updated TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_created ON records(created);
"#;

/// FTS5 external-content index over `records.text`
///
/// Uses Porter stemming + Unicode normalization.
pub const RECORDS_FTS_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
    text,
    content=records,
    content_rowid=rowid,
    tokenize='porter unicode61 remove_diacritics 2'
);
"#;

/// Triggers keeping `records_fts` in sync with `records`
///
/// Embedding updates do not touch `text`, so the update trigger is scoped to that column.
pub const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS records_ai AFTER INSERT ON records BEGIN
    INSERT INTO records_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
END;

CREATE TRIGGER IF NOT EXISTS records_ad AFTER DELETE ON records BEGIN
    INSERT INTO records_fts(records_fts, rowid, text) VALUES ('delete', OLD.rowid, OLD.text);
END;

CREATE TRIGGER IF NOT EXISTS records_au AFTER UPDATE OF text ON records BEGIN
    INSERT INTO records_fts(records_fts, rowid, text) VALUES ('delete', OLD.rowid, OLD.text);
    INSERT INTO records_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
END;
"#;

/// Repopulate the index from `records` (used when the index is created over existing rows)
pub const FTS_REBUILD_SQL: &str = "INSERT INTO records_fts(records_fts) VALUES ('rebuild')";

//! SQL migration definitions for the manual index database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: chunks with embeddings, corpus revision counter",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per document-level chunk. rowid order is the store's native order.
CREATE TABLE IF NOT EXISTS chunks (
    id          TEXT PRIMARY KEY,
    text        TEXT NOT NULL,
    section     TEXT NOT NULL,
    document    TEXT NOT NULL,
    source      TEXT NOT NULL,
    image_paths TEXT NOT NULL DEFAULT '',
    image_names TEXT NOT NULL DEFAULT '',
    embedding   BLOB NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document);
CREATE INDEX IF NOT EXISTS idx_chunks_section ON chunks(section);

-- Monotonic revision, bumped on every change to chunks
CREATE TABLE IF NOT EXISTS corpus_meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO corpus_meta (key, value) VALUES ('revision', 0);

CREATE TRIGGER IF NOT EXISTS chunks_revision_insert AFTER INSERT ON chunks BEGIN
    UPDATE corpus_meta SET value = value + 1 WHERE key = 'revision';
END;

CREATE TRIGGER IF NOT EXISTS chunks_revision_update AFTER UPDATE ON chunks BEGIN
    UPDATE corpus_meta SET value = value + 1 WHERE key = 'revision';
END;

CREATE TRIGGER IF NOT EXISTS chunks_revision_delete AFTER DELETE ON chunks BEGIN
    UPDATE corpus_meta SET value = value + 1 WHERE key = 'revision';
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

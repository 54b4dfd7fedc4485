//! Turso Embedded / libSQL storage layer for the manual chunk index.
//!
//! The [`Storage`] struct wraps a libSQL database holding one row per chunk:
//! text, section/document/source metadata, comma-joined image lists and the
//! chunk embedding. [`LibsqlCorpus`] pairs it with an embedder to serve
//! similarity queries.
//!
//! **Access rules:**
//! - Ingestion tooling: read-write via [`Storage::open`]
//! - Query pipeline: read-only via [`Storage::open_readonly`]

pub mod codec;
mod corpus;
mod migrations;

use std::path::Path;

use chrono::Utc;
use evmanual_shared::{Chunk, ChunkMetadata, EvManualError, ImageRef, MetadataFilter, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

pub use corpus::LibsqlCorpus;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A chunk to be written, with its precomputed embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub section: String,
    pub document: String,
    pub source: String,
    pub image_refs: Vec<ImageRef>,
    pub embedding: Vec<f32>,
}

/// A stored chunk together with its embedding.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

const CHUNK_COLUMNS: &str =
    "id, text, section, document, source, image_paths, image_names, embedding";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EvManualError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EvManualError::Storage(format!(
                "index not found at {}; populate it with the ingestion tooling first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        EvManualError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(EvManualError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chunk operations
    // -----------------------------------------------------------------------

    /// Insert a chunk. Returns the generated chunk ID.
    pub async fn insert_chunk(&self, chunk: &NewChunk) -> Result<String> {
        self.check_writable()?;
        if chunk.text.trim().is_empty() {
            return Err(EvManualError::validation("chunk text must not be empty"));
        }
        if chunk.embedding.is_empty() {
            return Err(EvManualError::validation("chunk embedding must not be empty"));
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let paths: Vec<&str> = chunk.image_refs.iter().map(|r| r.path.as_str()).collect();
        let names: Vec<&str> = chunk.image_refs.iter().map(|r| r.name.as_str()).collect();

        self.conn
            .execute(
                "INSERT INTO chunks (id, text, section, document, source, image_paths, image_names, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    chunk.text.as_str(),
                    chunk.section.as_str(),
                    chunk.document.as_str(),
                    chunk.source.as_str(),
                    codec::join_list(&paths),
                    codec::join_list(&names),
                    codec::encode_embedding(&chunk.embedding),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Delete every chunk (used before re-population).
    pub async fn clear_chunks(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM chunks", params![])
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Number of stored chunks.
    pub async fn count_chunks(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM chunks", params![])
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map_err(|e| EvManualError::Storage(e.to_string()))?
                .max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(EvManualError::Storage(e.to_string())),
        }
    }

    /// Load chunks with embeddings in native (rowid) order, optionally filtered.
    pub async fn load_chunks(&self, filter: Option<&MetadataFilter>) -> Result<Vec<StoredChunk>> {
        let mut rows = match filter {
            Some(filter) => {
                let sql =
                    format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE document = ?1 ORDER BY rowid");
                self.conn
                    .query(&sql, params![filter.document.as_str()])
                    .await
            }
            None => {
                let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks ORDER BY rowid");
                self.conn.query(&sql, params![]).await
            }
        }
        .map_err(|e| EvManualError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => results.push(row_to_stored_chunk(&row)?),
                Ok(None) => break,
                Err(e) => return Err(EvManualError::Storage(e.to_string())),
            }
        }
        Ok(results)
    }

    /// Metadata of every stored chunk, in native order.
    pub async fn all_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let mut rows = self
            .conn
            .query(
                "SELECT section, document, source FROM chunks ORDER BY rowid",
                params![],
            )
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => results.push(ChunkMetadata {
                    section: get_string(&row, 0)?,
                    document: get_string(&row, 1)?,
                    source: get_string(&row, 2)?,
                }),
                Ok(None) => break,
                Err(e) => return Err(EvManualError::Storage(e.to_string())),
            }
        }
        Ok(results)
    }

    /// Current corpus revision; changes whenever chunks are written.
    pub async fn revision(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM corpus_meta WHERE key = 'revision'",
                params![],
            )
            .await
            .map_err(|e| EvManualError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map_err(|e| EvManualError::Storage(e.to_string()))?
                .max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(EvManualError::Storage(e.to_string())),
        }
    }
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| EvManualError::Storage(e.to_string()))
}

/// Convert a database row (selected with [`CHUNK_COLUMNS`]) to a [`StoredChunk`].
fn row_to_stored_chunk(row: &libsql::Row) -> Result<StoredChunk> {
    let image_paths = get_string(row, 5)?;
    let image_names = get_string(row, 6)?;
    let blob: Vec<u8> = row
        .get(7)
        .map_err(|e| EvManualError::Storage(e.to_string()))?;

    Ok(StoredChunk {
        chunk: Chunk {
            id: get_string(row, 0)?,
            text: get_string(row, 1)?,
            section: get_string(row, 2)?,
            document: get_string(row, 3)?,
            source: get_string(row, 4)?,
            image_refs: codec::pair_image_refs(&image_paths, &image_names),
        },
        embedding: codec::decode_embedding(&blob)?,
    })
}

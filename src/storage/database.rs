//! SQLite database management with migrations
//!
//! Durable home of indexed documents. In-memory vector indexes are rebuilt
//! from these rows at startup.

use crate::embedding::{
    belongs_to_source, bytes_to_embedding, embedding_to_bytes, Document, Partition,
};
use crate::error::{RagtierError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Index configuration recorded the first time a partition is opened
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub dimension: usize,
    pub metric: String,
    pub model: String,
}

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `db_path` and bring its schema up
    /// to date.
    ///
    /// Any failure, including a file that is not a SQLite database, is
    /// reported as `UpstreamUnavailable`.
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::connect(db_path).map_err(|e| match e {
            RagtierError::UpstreamUnavailable(_) => e,
            other => RagtierError::UpstreamUnavailable(format!(
                "Failed to open document store {}: {}",
                db_path.display(),
                other
            )),
        })
    }

    fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagtierError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder().max_size(8).build(manager).map_err(|e| {
            RagtierError::UpstreamUnavailable(format!(
                "Failed to create connection pool for {}: {}",
                db_path.display(),
                e
            ))
        })?;

        {
            let conn = pool.get().map_err(|e| {
                RagtierError::UpstreamUnavailable(format!("Failed to get connection: {}", e))
            })?;

            // WAL lets readers proceed while an ingestion writes
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| RagtierError::UpstreamUnavailable(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert or replace a document. A replaced row moves to the end of the
    /// insertion order.
    pub fn put_document(&self, doc: &Document) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents
                (partition, id, source_name, text, embedding, content_hash, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.partition.as_str(),
                doc.id,
                doc.source_name,
                doc.text,
                embedding_to_bytes(&doc.vector),
                doc.content_hash,
                doc.model,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Delete one document, returning whether a row existed
    pub fn delete_document(&self, partition: Partition, id: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM documents WHERE partition = ?1 AND id = ?2",
            params![partition.as_str(), id],
        )?;
        Ok(removed > 0)
    }

    /// Ids stored for a source: the source id itself and its `<id>#<n>` chunks
    pub fn source_ids(&self, partition: Partition, source_id: &str) -> Result<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM documents
             WHERE partition = ?1 AND (id = ?2 OR substr(id, 1, length(?2) + 1) = ?2 || '#')
             ORDER BY seq ASC",
        )?;
        let ids = stmt
            .query_map(params![partition.as_str(), source_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids
            .into_iter()
            .filter(|id| belongs_to_source(id, source_id))
            .collect())
    }

    /// Delete every document of a partition, returning the number removed
    pub fn delete_partition(&self, partition: Partition) -> Result<usize> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM documents WHERE partition = ?1",
            params![partition.as_str()],
        )?;
        Ok(removed)
    }

    /// Load all documents of a partition in insertion order
    pub fn load_partition(&self, partition: Partition) -> Result<Vec<Document>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_name, text, embedding, content_hash, model
             FROM documents WHERE partition = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![partition.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, source_name, text, embedding, content_hash, model) = row?;
            let vector = bytes_to_embedding(&embedding).map_err(|e| {
                RagtierError::UpstreamUnavailable(format!("Corrupt embedding for {}: {}", id, e))
            })?;
            documents.push(Document {
                id,
                source_name,
                text,
                vector,
                partition,
                content_hash,
                model,
            });
        }

        Ok(documents)
    }

    /// Record index configuration for a partition (first writer wins)
    pub fn record_meta(&self, partition: Partition, meta: &IndexMeta) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO index_meta (partition, dimension, metric, model)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                partition.as_str(),
                meta.dimension as i64,
                meta.metric,
                meta.model
            ],
        )?;
        Ok(())
    }

    /// Index configuration recorded for a partition, if any
    pub fn meta(&self, partition: Partition) -> Result<Option<IndexMeta>> {
        let conn = self.get_conn()?;
        let meta = conn
            .query_row(
                "SELECT dimension, metric, model FROM index_meta WHERE partition = ?1",
                params![partition.as_str()],
                |row| {
                    Ok(IndexMeta {
                        dimension: row.get::<_, i64>(0)? as usize,
                        metric: row.get(1)?,
                        model: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Point a partition at a new embedding model. Rows embedded with
    /// the previous model keep their own `model` value.
    pub fn set_meta_model(&self, partition: Partition, model: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE index_meta SET model = ?2 WHERE partition = ?1",
            params![partition.as_str(), model],
        )?;
        Ok(())
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Indexed documents, one row per (partition, id)
    CREATE TABLE documents (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        partition TEXT NOT NULL,
        id TEXT NOT NULL,
        source_name TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        content_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (partition, id)
    );

    CREATE INDEX idx_documents_partition ON documents(partition);

    -- Fixed per-partition index configuration
    CREATE TABLE index_meta (
        partition TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL,
        metric TEXT NOT NULL,
        model TEXT NOT NULL
    );
    "#,
    // Migration 2: per-document embedding model
    r#"
    ALTER TABLE documents ADD COLUMN model TEXT NOT NULL DEFAULT '';

    UPDATE documents SET model = COALESCE(
        (SELECT m.model FROM index_meta m WHERE m.partition = documents.partition),
        ''
    );
    "#,
];

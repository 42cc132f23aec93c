//! SQLite-backed [`PersistenceBackend`].
//!
//! One table, `feature_hub`:
//!
//! | column     | type    | description                                  |
//! |------------|---------|----------------------------------------------|
//! | seq        | INTEGER | insertion order, autoincrement primary key   |
//! | custom_id  | INTEGER | caller-assigned key, unique                  |
//! | tag        | TEXT    | display label, stored untruncated            |
//! | embedding  | BLOB    | little-endian f32 vector (4 x N bytes)       |
//! | created_at | TEXT    | RFC-3339 insertion time (UTC)                |
//! | updated_at | TEXT    | RFC-3339 last update time (UTC)              |

use crate::persistence::{PersistenceBackend, PersistenceError};
use crate::types::{Embedding, FeatureRecord};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

/// File name used when the configured database path is a directory.
pub const DB_FILE_NAME: &str = "face_gallery.db";

pub struct SqliteBackend {
    conn: Connection,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(|source| PersistenceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let backend = Self { conn };
        backend.init_schema()?;
        tracing::info!(path = %path.display(), "opened feature database");
        Ok(backend)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let backend = Self { conn };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS feature_hub (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                custom_id  INTEGER NOT NULL UNIQUE,
                tag        TEXT    NOT NULL,
                embedding  BLOB    NOT NULL,
                created_at TEXT    NOT NULL,
                updated_at TEXT    NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl PersistenceBackend for SqliteBackend {
    fn load_all(&self) -> Result<Vec<FeatureRecord>, PersistenceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT custom_id, tag, embedding FROM feature_hub ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            let custom_id: i32 = row.get(0)?;
            let tag: String = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            Ok((custom_id, tag, blob))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (custom_id, tag, blob) = row?;
            let embedding = bytes_to_embedding(&blob).ok_or(PersistenceError::CorruptEmbedding {
                custom_id,
                len: blob.len(),
            })?;
            records.push(FeatureRecord {
                custom_id,
                tag,
                embedding,
            });
        }
        Ok(records)
    }

    fn insert(&mut self, record: &FeatureRecord) -> Result<(), PersistenceError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO feature_hub (custom_id, tag, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                record.custom_id,
                record.tag,
                embedding_to_bytes(&record.embedding),
                now,
            ],
        )?;
        Ok(())
    }

    fn update(&mut self, record: &FeatureRecord) -> Result<(), PersistenceError> {
        let changed = self.conn.execute(
            "UPDATE feature_hub SET tag = ?2, embedding = ?3, updated_at = ?4 WHERE custom_id = ?1",
            params![
                record.custom_id,
                record.tag,
                embedding_to_bytes(&record.embedding),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(record.custom_id));
        }
        Ok(())
    }

    fn delete(&mut self, custom_id: i32) -> Result<(), PersistenceError> {
        let changed = self
            .conn
            .execute("DELETE FROM feature_hub WHERE custom_id = ?1", params![custom_id])?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(custom_id));
        }
        Ok(())
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feature_hub", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// One past both the AUTOINCREMENT high-water mark and the largest stored id,
    /// so keys of deleted rows are never reissued.
    fn next_key(&self) -> Result<i64, PersistenceError> {
        let next: i64 = self.conn.query_row(
            "SELECT MAX(
                 COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'feature_hub'), 0),
                 COALESCE((SELECT MAX(custom_id) FROM feature_hub), 0)
             ) + 1",
            [],
            |row| row.get(0),
        )?;
        Ok(next)
    }
}

fn embedding_to_bytes(embedding: &Embedding) -> Vec<u8> {
    embedding.values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Option<Embedding> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    let values = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Some(Embedding { values })
}

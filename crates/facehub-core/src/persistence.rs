//! Durable mirror of the feature gallery.

use crate::types::FeatureRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no durable record with custom id {0}")]
    NotFound(i32),
    #[error("corrupt embedding blob for custom id {custom_id}: {len} bytes")]
    CorruptEmbedding { custom_id: i32, len: usize },
}

/// Key-record storage keyed by custom id.
///
/// The in-memory gallery answers queries; a backend only mirrors mutations
/// and supplies the initial records on load.
pub trait PersistenceBackend: Send {
    /// Every durable record, in insertion order.
    fn load_all(&self) -> Result<Vec<FeatureRecord>, PersistenceError>;

    fn insert(&mut self, record: &FeatureRecord) -> Result<(), PersistenceError>;

    fn update(&mut self, record: &FeatureRecord) -> Result<(), PersistenceError>;

    fn delete(&mut self, custom_id: i32) -> Result<(), PersistenceError>;

    fn count(&self) -> Result<usize, PersistenceError>;

    /// Smallest key never handed out by this backend, for auto-increment galleries.
    fn next_key(&self) -> Result<i64, PersistenceError> {
        let highest = self.load_all()?.iter().map(|r| i64::from(r.custom_id)).max();
        Ok(highest.unwrap_or(0) + 1)
    }
}

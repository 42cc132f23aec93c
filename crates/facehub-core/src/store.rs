//! In-memory feature gallery with an optional durable mirror.
//!
//! The gallery is the source of truth for queries. Mutations are applied in
//! memory first and then mirrored to the bound [`PersistenceBackend`]; a
//! mirror failure is reported but does not roll the in-memory change back.

use crate::persistence::{PersistenceBackend, PersistenceError};
use crate::types::{Embedding, FeatureRecord, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Who assigns the custom id of a new record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyMode {
    /// The caller supplies the id on insert.
    #[default]
    Manual,
    /// The gallery allocates increasing ids and never reissues one.
    AutoIncrement,
}

/// How far a search scans the gallery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Score every record and report the best.
    #[default]
    Exhaustive,
    /// Stop at the first record reaching the threshold.
    Eager,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("custom id {0} already exists")]
    IdAlreadyExists(i32),
    #[error("custom id {0} is not in the gallery")]
    InvalidIndex(i32),
    #[error("embedding has {actual} dimensions, gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding is empty")]
    EmptyEmbedding,
    #[error("no persistence backend is bound")]
    NoBackend,
    #[error("primary key mode cannot change while the gallery holds records")]
    KeyModeLocked,
    #[error("no custom ids left to allocate")]
    KeysExhausted,
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Records in insertion order plus a custom id -> position index.
pub struct FeatureStore {
    records: Vec<FeatureRecord>,
    positions: HashMap<i32, usize>,
    dimension: Option<usize>,
    key_mode: PrimaryKeyMode,
    search_mode: SearchMode,
    /// One past the largest id ever held in memory.
    next_id: i64,
    backend: Option<Box<dyn PersistenceBackend>>,
}

impl std::fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore")
            .field("len", &self.records.len())
            .field("dimension", &self.dimension)
            .field("key_mode", &self.key_mode)
            .field("search_mode", &self.search_mode)
            .field("persistent", &self.backend.is_some())
            .finish()
    }
}

impl Default for FeatureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureStore {
    /// An empty gallery whose dimensionality is fixed by the first insert.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            positions: HashMap::new(),
            dimension: None,
            key_mode: PrimaryKeyMode::default(),
            search_mode: SearchMode::default(),
            next_id: 1,
            backend: None,
        }
    }

    /// An empty gallery that only accepts `dimension`-length embeddings.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::new()
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn primary_key_mode(&self) -> PrimaryKeyMode {
        self.key_mode
    }

    /// Only allowed while the gallery is empty.
    pub fn set_primary_key_mode(&mut self, mode: PrimaryKeyMode) -> Result<(), StoreError> {
        if mode != self.key_mode && !self.records.is_empty() {
            return Err(StoreError::KeyModeLocked);
        }
        self.key_mode = mode;
        Ok(())
    }

    pub fn search_mode(&self) -> SearchMode {
        self.search_mode
    }

    pub fn set_search_mode(&mut self, mode: SearchMode) {
        self.search_mode = mode;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn record_at(&self, index: usize) -> Option<&FeatureRecord> {
        self.records.get(index)
    }

    /// Store index of `custom_id`, by exact key lookup.
    pub fn position(&self, custom_id: i32) -> Option<usize> {
        self.positions.get(&custom_id).copied()
    }

    pub fn get(&self, custom_id: i32) -> Option<&FeatureRecord> {
        self.position(custom_id).map(|i| &self.records[i])
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_some()
    }

    /// Bind a durable mirror. Replaces any previously bound backend.
    pub fn attach_backend(&mut self, backend: Box<dyn PersistenceBackend>) {
        self.backend = Some(backend);
    }

    pub fn detach_backend(&mut self) -> Option<Box<dyn PersistenceBackend>> {
        self.backend.take()
    }

    /// Number of records held by the bound backend.
    pub fn durable_count(&self) -> Result<usize, StoreError> {
        let backend = self.backend.as_ref().ok_or(StoreError::NoBackend)?;
        Ok(backend.count()?)
    }

    /// Every record held by the bound backend, in insertion order.
    pub fn durable_records(&self) -> Result<Vec<FeatureRecord>, StoreError> {
        let backend = self.backend.as_ref().ok_or(StoreError::NoBackend)?;
        Ok(backend.load_all()?)
    }

    /// Add a new identity and return the id it is stored under.
    ///
    /// With [`PrimaryKeyMode::Manual`] the record is stored under `custom_id`,
    /// failing if that id is already present. With
    /// [`PrimaryKeyMode::AutoIncrement`] `custom_id` is ignored and a fresh id
    /// is allocated.
    pub fn insert(&mut self, embedding: &Embedding, tag: &str, custom_id: i32) -> Result<i32, StoreError> {
        let custom_id = match self.key_mode {
            PrimaryKeyMode::Manual => custom_id,
            PrimaryKeyMode::AutoIncrement => self.allocate_id()?,
        };
        let record = FeatureRecord {
            custom_id,
            tag: tag.to_string(),
            embedding: embedding.clone(),
        };
        self.insert_in_memory(record)?;

        if let Some(backend) = self.backend.as_mut() {
            let index = self.records.len() - 1;
            if let Err(e) = backend.insert(&self.records[index]) {
                tracing::warn!(custom_id, error = %e, "insert mirror failed; gallery and database diverge");
                return Err(e.into());
            }
        }
        tracing::debug!(custom_id, tag, size = self.records.len(), "feature inserted");
        Ok(custom_id)
    }

    /// Replace tag and embedding of an existing identity.
    pub fn update(&mut self, embedding: &Embedding, tag: &str, custom_id: i32) -> Result<(), StoreError> {
        let index = self.position(custom_id).ok_or(StoreError::InvalidIndex(custom_id))?;
        self.check_dimension(embedding)?;

        let record = &mut self.records[index];
        record.tag = tag.to_string();
        record.embedding = embedding.clone();

        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.update(&self.records[index]) {
                tracing::warn!(custom_id, error = %e, "update mirror failed; gallery and database diverge");
                return Err(e.into());
            }
        }
        tracing::debug!(custom_id, tag, "feature updated");
        Ok(())
    }

    /// Remove an identity, preserving the relative order of the rest.
    pub fn delete(&mut self, custom_id: i32) -> Result<(), StoreError> {
        let index = self.position(custom_id).ok_or(StoreError::InvalidIndex(custom_id))?;
        self.records.remove(index);
        self.positions.remove(&custom_id);
        for record in &self.records[index..] {
            if let Some(pos) = self.positions.get_mut(&record.custom_id) {
                *pos -= 1;
            }
        }

        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.delete(custom_id) {
                tracing::warn!(custom_id, error = %e, "delete mirror failed; gallery and database diverge");
                return Err(e.into());
            }
        }
        tracing::debug!(custom_id, size = self.records.len(), "feature deleted");
        Ok(())
    }

    /// Find the most similar stored identity by cosine similarity.
    ///
    /// In [`SearchMode::Exhaustive`] every record is scored and the first
    /// record with the highest score wins ties. [`SearchMode::Eager`] stops at
    /// the first record reaching `threshold`. The best candidate is reported only when its score reaches
    /// `threshold`, unless `return_best_below_threshold` is set.
    pub fn search(
        &self,
        query: &Embedding,
        threshold: f32,
        return_best_below_threshold: bool,
    ) -> Result<SearchResult, StoreError> {
        self.check_dimension(query)?;

        let mut best_score = f32::NEG_INFINITY;
        let mut best_index: Option<usize> = None;
        for (i, record) in self.records.iter().enumerate() {
            let score = query.similarity(&record.embedding);
            if score > best_score {
                best_score = score;
                best_index = Some(i);
            }
            if self.search_mode == SearchMode::Eager && best_score >= threshold {
                break;
            }
        }

        let result = match best_index {
            Some(i) if best_score >= threshold || return_best_below_threshold => {
                let record = &self.records[i];
                SearchResult {
                    index: Some(i),
                    custom_id: Some(record.custom_id),
                    score: best_score,
                    tag: record.tag.clone(),
                }
            }
            Some(_) => SearchResult::no_match(best_score),
            None => SearchResult::no_match(0.0),
        };
        tracing::debug!(
            threshold,
            score = result.score,
            matched = ?result.custom_id,
            "gallery searched"
        );
        Ok(result)
    }

    /// Populate the gallery from the bound backend through the insert validation path.
    ///
    /// Any record that fails validation aborts the load and restores the
    /// gallery to its state before the call.
    pub fn load_from_backend(&mut self) -> Result<usize, StoreError> {
        let backend = self.backend.as_ref().ok_or(StoreError::NoBackend)?;
        let loaded = backend.load_all()?;

        let checkpoint = self.records.len();
        let dimension = self.dimension;
        let next_id = self.next_id;
        for record in loaded {
            let custom_id = record.custom_id;
            if let Err(e) = self.insert_in_memory(record) {
                tracing::error!(custom_id, error = %e, "gallery load aborted");
                for dropped in self.records.drain(checkpoint..) {
                    self.positions.remove(&dropped.custom_id);
                }
                self.dimension = dimension;
                self.next_id = next_id;
                return Err(e);
            }
        }

        let count = self.records.len() - checkpoint;
        tracing::info!(count, "gallery loaded from database");
        Ok(count)
    }

    fn insert_in_memory(&mut self, record: FeatureRecord) -> Result<(), StoreError> {
        if self.positions.contains_key(&record.custom_id) {
            return Err(StoreError::IdAlreadyExists(record.custom_id));
        }
        self.check_dimension(&record.embedding)?;
        if self.dimension.is_none() {
            self.dimension = Some(record.embedding.len());
        }
        self.next_id = self.next_id.max(i64::from(record.custom_id) + 1);
        self.positions.insert(record.custom_id, self.records.len());
        self.records.push(record);
        Ok(())
    }

    fn allocate_id(&self) -> Result<i32, StoreError> {
        let durable = match self.backend.as_ref() {
            Some(backend) => backend.next_key()?,
            None => 1,
        };
        i32::try_from(durable.max(self.next_id)).map_err(|_| StoreError::KeysExhausted)
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), StoreError> {
        if embedding.is_empty() {
            return Err(StoreError::EmptyEmbedding);
        }
        match self.dimension {
            Some(expected) if expected != embedding.len() => Err(StoreError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(()),
        }
    }
}

//! The per-session facade: owns the collaborators, the gallery and every
//! frame-scoped cache, and sequences calls between them.

use crate::cache::{AttributeCache, ResultCache, TrackingCache};
use crate::config::{DatabaseConfiguration, DetectMode, FeatureHubConfig, SessionConfig};
use crate::error::SessionError;
use facehub_core::codec;
use facehub_core::{
    AttributePipeline, AttributeStage, Embedding, FaceRecord, FeatureStore, Frame, ModelLoader,
    OutputTag, PersistenceBackend, PipelineParams, Recognizer, SearchResult, SqliteBackend, Tracker,
    SearchMode, TAG_CAPACITY,
};
use std::path::Path;

/// Collaborators built from one model archive.
struct Components {
    tracker: Box<dyn Tracker>,
    recognizer: Option<Box<dyn Recognizer>>,
    pipeline: Box<dyn AttributePipeline>,
    params: PipelineParams,
    max_detect_faces: usize,
}

/// A gallery record as served through the session's output caches.
#[derive(Debug)]
pub struct FeatureView<'a> {
    pub custom_id: i32,
    pub embedding: &'a Embedding,
    pub tag: &'a OutputTag<TAG_CAPACITY>,
}

/// One configured face-analysis session.
///
/// Not meant for concurrent mutation; wrap it in a
/// [`SessionHandle`](crate::engine::SessionHandle) to share it.
pub struct SessionContext {
    loader: Box<dyn ModelLoader>,
    components: Option<Components>,
    detect_mode: DetectMode,
    hub: FeatureHubConfig,
    store: FeatureStore,
    /// Set once persistence has been decided for the current configuration,
    /// either explicitly or by the first gallery mutation.
    database: Option<DatabaseConfiguration>,
    cache: ResultCache,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("configured", &self.components.is_some())
            .field("detect_mode", &self.detect_mode)
            .field("hub", &self.hub)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// An unconfigured session that will open model archives through `loader`.
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            components: None,
            detect_mode: DetectMode::default(),
            hub: FeatureHubConfig::default(),
            store: FeatureStore::new(),
            database: None,
            cache: ResultCache::default(),
        }
    }

    /// Build and fully configure a session from `config`, persistence included.
    pub fn from_config(loader: impl ModelLoader + 'static, config: &SessionConfig) -> Result<Self, SessionError> {
        let mut session = Self::new(loader);
        session.set_feature_hub(config.feature_hub)?;
        session.configure(
            &config.model_path,
            config.detect_mode,
            config.max_detect_faces,
            config.pipeline,
        )?;
        if let Some(size) = config.track_preview_size {
            session.set_track_preview_size(size)?;
        }
        session.configure_persistence(config.database.clone())?;
        Ok(session)
    }

    /// Load the model archive and build the tracker, recognizer and attribute pipeline.
    ///
    /// All prior session state is discarded first, so a failed call leaves
    /// the session unconfigured with an empty gallery.
    pub fn configure(
        &mut self,
        model_path: &Path,
        detect_mode: DetectMode,
        max_detect_faces: usize,
        params: PipelineParams,
    ) -> Result<(), SessionError> {
        self.components = None;
        self.store = FeatureStore::new();
        self.database = None;
        self.cache = ResultCache::default();

        if max_detect_faces == 0 {
            return Err(SessionError::InvalidParameter(
                "max_detect_faces must be at least 1".into(),
            ));
        }

        let path = model_path.display().to_string();
        let archive_err = |reason: String| SessionError::ArchiveLoad {
            path: path.clone(),
            reason,
        };
        if !model_path.exists() {
            return Err(archive_err("file not found".into()));
        }
        let archive = self
            .loader
            .load(model_path)
            .map_err(|e| archive_err(e.to_string()))?;

        let tracker = archive
            .tracker(max_detect_faces)
            .map_err(|e| archive_err(format!("tracker: {e}")))?;
        let recognizer = if params.enable_recognition {
            Some(
                archive
                    .recognizer()
                    .map_err(|e| archive_err(format!("recognizer: {e}")))?,
            )
        } else {
            None
        };
        let pipeline = archive
            .pipeline(&params)
            .map_err(|e| archive_err(format!("pipeline: {e}")))?;

        let mut store = match &recognizer {
            Some(r) => FeatureStore::with_dimension(r.dimension()),
            None => FeatureStore::new(),
        };
        store.set_primary_key_mode(self.hub.primary_key_mode)?;
        store.set_search_mode(self.hub.search_mode);
        self.store = store;
        self.set_detect_mode(detect_mode);
        self.components = Some(Components {
            tracker,
            recognizer,
            pipeline,
            params,
            max_detect_faces,
        });

        tracing::info!(
            path = %path,
            ?detect_mode,
            max_detect_faces,
            ?params,
            "session configured"
        );
        Ok(())
    }

    /// Decide persistence for this configuration. Accepted once per `configure`.
    ///
    /// When enabled, opens the SQLite database and loads every stored record
    /// into the gallery. Returns the number of records loaded.
    pub fn configure_persistence(&mut self, database: DatabaseConfiguration) -> Result<usize, SessionError> {
        self.ensure_configured()?;
        if self.database.is_some() {
            return Err(SessionError::PersistenceAlreadyConfigured);
        }
        if !database.enable_persistence {
            tracing::info!("persistence disabled");
            self.database = Some(database);
            return Ok(0);
        }

        let file = database.database_file();
        let backend = SqliteBackend::open(&file)?;
        self.attach_persistence(database, Box::new(backend))
    }

    /// Like [`configure_persistence`](Self::configure_persistence) with a caller-supplied backend.
    pub fn attach_persistence(
        &mut self,
        database: DatabaseConfiguration,
        backend: Box<dyn PersistenceBackend>,
    ) -> Result<usize, SessionError> {
        self.ensure_configured()?;
        if self.database.is_some() {
            return Err(SessionError::PersistenceAlreadyConfigured);
        }

        self.store.attach_backend(backend);
        match self.store.load_from_backend() {
            Ok(count) => {
                self.database = Some(database);
                Ok(count)
            }
            Err(e) => {
                self.store.detach_backend();
                Err(e.into())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.components.is_some()
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    pub fn pipeline_params(&self) -> Option<&PipelineParams> {
        self.components.as_ref().map(|c| &c.params)
    }

    pub fn max_detect_faces(&self) -> Option<usize> {
        self.components.as_ref().map(|c| c.max_detect_faces)
    }

    pub fn detect_mode(&self) -> DetectMode {
        self.detect_mode
    }

    /// Takes effect on the next [`detect_and_track`](Self::detect_and_track).
    pub fn set_detect_mode(&mut self, mode: DetectMode) {
        self.detect_mode = mode;
    }

    pub fn feature_hub(&self) -> &FeatureHubConfig {
        &self.hub
    }

    /// Replace the feature-hub settings.
    ///
    /// The primary key mode can only change while the gallery is empty.
    pub fn set_feature_hub(&mut self, hub: FeatureHubConfig) -> Result<(), SessionError> {
        check_threshold(hub.search_threshold)?;
        self.store.set_primary_key_mode(hub.primary_key_mode)?;
        self.store.set_search_mode(hub.search_mode);
        self.hub = hub;
        Ok(())
    }

    pub fn recognition_threshold(&self) -> f32 {
        self.hub.search_threshold
    }

    pub fn set_recognition_threshold(&mut self, threshold: f32) -> Result<(), SessionError> {
        check_threshold(threshold)?;
        self.hub.search_threshold = threshold;
        Ok(())
    }

    pub fn set_search_most_similar(&mut self, enabled: bool) {
        self.hub.search_most_similar = enabled;
    }

    pub fn set_search_mode(&mut self, mode: SearchMode) {
        self.hub.search_mode = mode;
        self.store.set_search_mode(mode);
    }

    pub fn set_track_preview_size(&mut self, size: i32) -> Result<(), SessionError> {
        let components = self.components.as_mut().ok_or(SessionError::TrackerUnavailable)?;
        if size <= 0 {
            return Err(SessionError::InvalidParameter(format!(
                "track preview size must be positive, got {size}"
            )));
        }
        components.tracker.set_preview_size(size);
        Ok(())
    }

    /// Track faces in `frame` and replace the tracking cache with the result.
    ///
    /// Tracking and attribute caches are emptied before anything else, so a
    /// failed call leaves them empty rather than stale.
    pub fn detect_and_track(&mut self, frame: &Frame) -> Result<usize, SessionError> {
        self.cache.tracking = TrackingCache::default();
        self.cache.attributes = AttributeCache::default();

        let components = self.components.as_mut().ok_or(SessionError::TrackerUnavailable)?;
        let always_detect = self.detect_mode.always_detect();
        let faces = components
            .tracker
            .update(frame, always_detect)
            .map_err(SessionError::Tracker)?;

        self.cache.tracking = TrackingCache::from_faces(&faces);
        tracing::debug!(faces = faces.len(), always_detect, "frame tracked");
        Ok(faces.len())
    }

    pub fn faces_detected(&self) -> usize {
        self.cache.tracking.len()
    }

    /// Run the attribute stages enabled in `params` for each face.
    ///
    /// Attribute slots start as [`NOT_COMPUTED`](crate::cache::NOT_COMPUTED).
    /// The first stage failure stops the batch; scores written for earlier
    /// faces stay in the cache.
    pub fn faces_process(
        &mut self,
        frame: &Frame,
        faces: &[FaceRecord],
        params: &PipelineParams,
    ) -> Result<(), SessionError> {
        let components = self.components.as_mut().ok_or(SessionError::NotConfigured)?;
        self.cache.attributes = AttributeCache::sized(faces.len());
        let attrs = &mut self.cache.attributes;
        let pipeline = &mut components.pipeline;

        for (i, face) in faces.iter().enumerate() {
            let mut run = |stage: AttributeStage| {
                pipeline.process(frame, face, stage).map_err(|e| {
                    tracing::debug!(face = i, %stage, error = %e, "attribute stage failed");
                    SessionError::Pipeline(e)
                })
            };
            if params.enable_liveness {
                attrs.liveness[i] = run(AttributeStage::RgbLiveness)?;
            }
            if params.enable_mask_detect {
                attrs.mask[i] = run(AttributeStage::Mask)?;
            }
            if params.enable_age_gender {
                attrs.age[i] = run(AttributeStage::Age)?;
                attrs.gender[i] = run(AttributeStage::Gender)?;
            }
        }
        Ok(())
    }

    /// Extract an embedding for one encoded face record into the extraction cache.
    pub fn face_feature_extract(&mut self, frame: &Frame, record: &[u8]) -> Result<&Embedding, SessionError> {
        let components = self.components.as_mut().ok_or(SessionError::NotConfigured)?;
        let recognizer = components
            .recognizer
            .as_mut()
            .ok_or(SessionError::RecognizerUnavailable)?;
        let face = codec::decode(record)?;

        self.cache.extracted.clear();
        self.cache.extracted = recognizer.extract(frame, &face).map_err(SessionError::Recognizer)?;
        tracing::debug!(track_id = face.track_id, dim = self.cache.extracted.len(), "feature extracted");
        Ok(&self.cache.extracted)
    }

    /// Quality of one encoded face record: one minus its mean keypoint score.
    pub fn face_quality(&self, record: &[u8]) -> Result<f32, SessionError> {
        let face = codec::decode(record)?;
        Ok(face.quality_score())
    }

    /// Search the gallery with the session threshold and most-similar setting.
    ///
    /// The searched-feature and tag caches are cleared first and then filled
    /// with the reported record, if any.
    pub fn search_face_feature(&mut self, query: &Embedding) -> Result<SearchResult, SessionError> {
        self.ensure_configured()?;
        self.cache.searched.clear();
        self.cache.tag.clear();

        let result = self
            .store
            .search(query, self.hub.search_threshold, self.hub.search_most_similar)?;
        if let Some(record) = result.index.and_then(|i| self.store.record_at(i)) {
            self.cache.searched = record.embedding.clone();
            self.cache.tag.set(&record.tag);
        }
        Ok(result)
    }

    /// Add a gallery record and return the id it is stored under.
    ///
    /// `custom_id` is ignored when the gallery allocates ids itself. A
    /// mutation made before persistence is configured fixes this
    /// configuration as non-persistent.
    pub fn insert_feature(&mut self, embedding: &Embedding, tag: &str, custom_id: i32) -> Result<i32, SessionError> {
        self.ensure_configured()?;
        self.settle_persistence();
        Ok(self.store.insert(embedding, tag, custom_id)?)
    }

    pub fn update_feature(&mut self, embedding: &Embedding, tag: &str, custom_id: i32) -> Result<(), SessionError> {
        self.ensure_configured()?;
        self.settle_persistence();
        self.store.update(embedding, tag, custom_id)?;
        Ok(())
    }

    pub fn remove_feature(&mut self, custom_id: i32) -> Result<(), SessionError> {
        self.ensure_configured()?;
        self.settle_persistence();
        self.store.delete(custom_id)?;
        Ok(())
    }

    /// Copy the record stored under `custom_id` into the searched-feature and tag caches.
    pub fn get_feature(&mut self, custom_id: i32) -> Result<FeatureView<'_>, SessionError> {
        self.ensure_configured()?;
        let record = self
            .store
            .get(custom_id)
            .ok_or(SessionError::InvalidIndex(custom_id))?;
        self.cache.searched = record.embedding.clone();
        self.cache.tag.set(&record.tag);
        Ok(FeatureView {
            custom_id,
            embedding: &self.cache.searched,
            tag: &self.cache.tag,
        })
    }

    pub fn feature_count(&self) -> usize {
        self.store.len()
    }

    pub fn gallery(&self) -> &FeatureStore {
        &self.store
    }

    /// Log every durable record and return how many there are.
    pub fn view_db_table(&self) -> Result<usize, SessionError> {
        let records = self.store.durable_records()?;
        for record in &records {
            tracing::info!(
                custom_id = record.custom_id,
                tag = %record.tag,
                dim = record.embedding.len(),
                "durable feature"
            );
        }
        tracing::info!(count = records.len(), in_memory = self.store.len(), "feature table");
        Ok(records.len())
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn tracking(&self) -> &TrackingCache {
        &self.cache.tracking
    }

    pub fn attributes(&self) -> &AttributeCache {
        &self.cache.attributes
    }

    pub fn extracted_feature(&self) -> &Embedding {
        &self.cache.extracted
    }

    pub fn searched_feature(&self) -> &Embedding {
        &self.cache.searched
    }

    pub fn output_tag(&self) -> &OutputTag<TAG_CAPACITY> {
        &self.cache.tag
    }

    /// The gallery is about to diverge from any database; persistence can no longer be enabled.
    fn settle_persistence(&mut self) {
        if self.database.is_none() {
            tracing::info!("gallery mutated before persistence was configured; persistence disabled");
            self.database = Some(DatabaseConfiguration::default());
        }
    }

    fn ensure_configured(&self) -> Result<(), SessionError> {
        if self.components.is_some() {
            Ok(())
        } else {
            Err(SessionError::NotConfigured)
        }
    }
}

fn check_threshold(threshold: f32) -> Result<(), SessionError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(SessionError::InvalidParameter(format!(
            "recognition threshold must be finite, got {threshold}"
        )))
    }
}

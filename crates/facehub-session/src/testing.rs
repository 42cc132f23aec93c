//! Scripted collaborators for session tests.

use facehub_core::{
    AttributePipeline, AttributeStage, CapabilityError, Embedding, FaceRecord, FaceRect,
    FeatureRecord, Frame, ModelArchive, ModelLoader, PersistenceBackend, PersistenceError,
    PipelineParams, PixelFormat, Point2f, PoseQuality, Recognizer, TrackedFace, Tracker,
    KEYPOINT_COUNT,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const EMBEDDING_DIM: usize = 4;
pub const TRACKER_FAILURE: i32 = -1001;
pub const RECOGNIZER_FAILURE: i32 = -2001;
pub const PIPELINE_FAILURE: i32 = -3001;

/// Shared state between a test and the collaborators it hands to a session.
#[derive(Clone, Default)]
pub struct FakeLoader {
    frames: Arc<Mutex<VecDeque<Result<Vec<TrackedFace>, CapabilityError>>>>,
    failing_stages: Arc<Mutex<Vec<(i32, AttributeStage)>>>,
    pub always_detect_log: Arc<Mutex<Vec<bool>>>,
    pub preview_sizes: Arc<Mutex<Vec<i32>>>,
    pub stage_log: Arc<Mutex<Vec<(i32, AttributeStage)>>>,
    reject_archive: bool,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader that refuses every archive.
    pub fn rejecting() -> Self {
        Self {
            reject_archive: true,
            ..Self::default()
        }
    }

    /// Queue the tracker output for the next `update` call.
    pub fn push_frame(&self, faces: Vec<TrackedFace>) {
        self.frames.lock().unwrap().push_back(Ok(faces));
    }

    pub fn push_tracker_failure(&self) {
        self.frames
            .lock()
            .unwrap()
            .push_back(Err(CapabilityError::new(TRACKER_FAILURE, "tracker lost the stream")));
    }

    /// Make `stage` fail for the face whose track id is `track_id`.
    pub fn fail_stage(&self, track_id: i32, stage: AttributeStage) {
        self.failing_stages.lock().unwrap().push((track_id, stage));
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ModelArchive>, CapabilityError> {
        if self.reject_archive {
            return Err(CapabilityError::new(-1, format!("{} is not a model pack", path.display())));
        }
        Ok(Box::new(FakeArchive { shared: self.clone() }))
    }
}

struct FakeArchive {
    shared: FakeLoader,
}

impl ModelArchive for FakeArchive {
    fn tracker(&self, max_detect_faces: usize) -> Result<Box<dyn Tracker>, CapabilityError> {
        Ok(Box::new(ScriptedTracker {
            shared: self.shared.clone(),
            max_detect_faces,
        }))
    }

    fn recognizer(&self) -> Result<Box<dyn Recognizer>, CapabilityError> {
        Ok(Box::new(OneHotRecognizer))
    }

    fn pipeline(&self, _params: &PipelineParams) -> Result<Box<dyn AttributePipeline>, CapabilityError> {
        Ok(Box::new(OffsetPipeline {
            shared: self.shared.clone(),
        }))
    }
}

struct ScriptedTracker {
    shared: FakeLoader,
    max_detect_faces: usize,
}

impl Tracker for ScriptedTracker {
    fn update(&mut self, _frame: &Frame, always_detect: bool) -> Result<Vec<TrackedFace>, CapabilityError> {
        self.shared.always_detect_log.lock().unwrap().push(always_detect);
        let next = self.shared.frames.lock().unwrap().pop_front();
        let mut faces = next.unwrap_or_else(|| Ok(Vec::new()))?;
        faces.truncate(self.max_detect_faces);
        Ok(faces)
    }

    fn set_preview_size(&mut self, size: i32) {
        self.shared.preview_sizes.lock().unwrap().push(size);
    }
}

/// Embedding with a single 1.0 at `track_id mod EMBEDDING_DIM`. Negative ids fail.
struct OneHotRecognizer;

impl Recognizer for OneHotRecognizer {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn extract(&mut self, _frame: &Frame, face: &FaceRecord) -> Result<Embedding, CapabilityError> {
        if face.track_id < 0 {
            return Err(CapabilityError::new(RECOGNIZER_FAILURE, "face too small"));
        }
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[face.track_id as usize % EMBEDDING_DIM] = 1.0;
        Ok(Embedding::new(values))
    }
}

/// Scores each stage as `track_id + offset(stage)`.
struct OffsetPipeline {
    shared: FakeLoader,
}

pub fn stage_score(track_id: i32, stage: AttributeStage) -> f32 {
    let offset = match stage {
        AttributeStage::RgbLiveness => 0.1,
        AttributeStage::Mask => 0.2,
        AttributeStage::Age => 0.3,
        AttributeStage::Gender => 0.4,
    };
    track_id as f32 + offset
}

impl AttributePipeline for OffsetPipeline {
    fn process(&mut self, _frame: &Frame, face: &FaceRecord, stage: AttributeStage) -> Result<f32, CapabilityError> {
        self.shared.stage_log.lock().unwrap().push((face.track_id, stage));
        if self
            .shared
            .failing_stages
            .lock()
            .unwrap()
            .contains(&(face.track_id, stage))
        {
            return Err(CapabilityError::new(PIPELINE_FAILURE, format!("{stage} model failed")));
        }
        Ok(stage_score(face.track_id, stage))
    }
}

pub fn tracked(track_id: i32) -> TrackedFace {
    TrackedFace {
        track_id,
        rect: FaceRect {
            x: track_id * 10,
            y: 5,
            width: 64,
            height: 72,
        },
        detect_score: 0.95,
        keypoints: [Point2f { x: 1.0, y: 2.0 }; KEYPOINT_COUNT],
        quality: PoseQuality {
            pitch: track_id as f32,
            yaw: -(track_id as f32),
            roll: 0.5 * track_id as f32,
            landmarks: [Point2f::default(); KEYPOINT_COUNT],
            landmark_quality: [0.1; KEYPOINT_COUNT],
        },
    }
}

pub fn frame() -> Frame {
    Frame {
        data: vec![0u8; 16],
        width: 4,
        height: 4,
        format: PixelFormat::Gray8,
        rotation: Default::default(),
    }
}

/// A placeholder archive file; the fake loader only needs it to exist.
pub fn model_file() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("pack.bin");
    std::fs::write(&path, b"fake model pack").unwrap();
    (dir, path)
}

pub fn all_stages() -> PipelineParams {
    PipelineParams {
        enable_recognition: true,
        enable_liveness: true,
        enable_interaction_liveness: false,
        enable_mask_detect: true,
        enable_age_gender: true,
    }
}

/// In-memory backend whose rows stay visible to the test after the session takes it.
#[derive(Clone, Default)]
pub struct SharedBackend {
    pub rows: Arc<Mutex<Vec<FeatureRecord>>>,
    pub fail_load: bool,
    pub fail_writes: bool,
}

impl SharedBackend {
    fn check_write(&self, custom_id: i32) -> Result<(), PersistenceError> {
        if self.fail_writes {
            Err(PersistenceError::NotFound(custom_id))
        } else {
            Ok(())
        }
    }
}

impl PersistenceBackend for SharedBackend {
    fn load_all(&self) -> Result<Vec<FeatureRecord>, PersistenceError> {
        if self.fail_load {
            return Err(PersistenceError::CorruptEmbedding { custom_id: 1, len: 3 });
        }
        Ok(self.rows.lock().unwrap().clone())
    }

    fn insert(&mut self, record: &FeatureRecord) -> Result<(), PersistenceError> {
        self.check_write(record.custom_id)?;
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn update(&mut self, record: &FeatureRecord) -> Result<(), PersistenceError> {
        self.check_write(record.custom_id)?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.custom_id == record.custom_id)
            .ok_or(PersistenceError::NotFound(record.custom_id))?;
        *row = record.clone();
        Ok(())
    }

    fn delete(&mut self, custom_id: i32) -> Result<(), PersistenceError> {
        self.check_write(custom_id)?;
        self.rows.lock().unwrap().retain(|r| r.custom_id != custom_id);
        Ok(())
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        Ok(self.rows.lock().unwrap().len())
    }
}

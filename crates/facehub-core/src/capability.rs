//! Narrow interfaces to the collaborators a session drives but does not implement:
//! the model archive, the tracker, the recognizer and the attribute stages.

use crate::frame::Frame;
use crate::types::{Embedding, FaceRecord, TrackedFace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Failure reported by a collaborator. `code` is passed upward unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct CapabilityError {
    pub code: i32,
    pub message: String,
}

impl CapabilityError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Feature switches used when building collaborators and when processing faces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub enable_recognition: bool,
    pub enable_liveness: bool,
    pub enable_interaction_liveness: bool,
    pub enable_mask_detect: bool,
    /// Age and gender are gated together.
    pub enable_age_gender: bool,
}

/// One attribute inference stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeStage {
    RgbLiveness,
    Mask,
    Age,
    Gender,
}

impl fmt::Display for AttributeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeStage::RgbLiveness => "rgb_liveness",
            AttributeStage::Mask => "mask",
            AttributeStage::Age => "age",
            AttributeStage::Gender => "gender",
        };
        f.write_str(name)
    }
}

/// Detection plus tracking over successive frames.
pub trait Tracker: Send {
    /// Process `frame` and return the currently tracked faces in a stable order.
    ///
    /// With `always_detect` false the tracker may reuse associations from the
    /// previous frame instead of redetecting every face.
    fn update(&mut self, frame: &Frame, always_detect: bool) -> Result<Vec<TrackedFace>, CapabilityError>;

    /// Resize the internal preview used for tracking. Trackers without one ignore it.
    fn set_preview_size(&mut self, _size: i32) {}
}

/// Embedding extraction for a single face.
pub trait Recognizer: Send {
    /// Dimensionality of every embedding this recognizer produces.
    fn dimension(&self) -> usize;

    fn extract(&mut self, frame: &Frame, face: &FaceRecord) -> Result<Embedding, CapabilityError>;
}

/// Attribute inference (liveness, mask, age, gender), one stage per call.
pub trait AttributePipeline: Send {
    fn process(
        &mut self,
        frame: &Frame,
        face: &FaceRecord,
        stage: AttributeStage,
    ) -> Result<f32, CapabilityError>;
}

/// A validated model archive from which collaborators are built.
pub trait ModelArchive {
    fn tracker(&self, max_detect_faces: usize) -> Result<Box<dyn Tracker>, CapabilityError>;

    fn recognizer(&self) -> Result<Box<dyn Recognizer>, CapabilityError>;

    fn pipeline(&self, params: &PipelineParams) -> Result<Box<dyn AttributePipeline>, CapabilityError>;
}

/// Opens and validates model archives.
pub trait ModelLoader: Send {
    fn load(&self, path: &Path) -> Result<Box<dyn ModelArchive>, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_display() {
        let err = CapabilityError::new(-7, "tracker lost");
        assert_eq!(err.to_string(), "tracker lost (code -7)");
    }

    #[test]
    fn test_pipeline_params_default_all_disabled() {
        let params = PipelineParams::default();
        assert!(!params.enable_recognition);
        assert!(!params.enable_liveness);
        assert!(!params.enable_mask_detect);
        assert!(!params.enable_age_gender);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(AttributeStage::RgbLiveness.to_string(), "rgb_liveness");
        assert_eq!(AttributeStage::Gender.to_string(), "gender");
    }
}

//! Frame-scoped results held by a session.
//!
//! Each cache is rebuilt off to the side and swapped in whole, so a reader
//! never sees entries from two different frames.

use facehub_core::codec::{self, FaceRecordBytes};
use facehub_core::{Embedding, FaceRecord, FaceRect, OutputTag, PoseQuality, TrackedFace, TAG_CAPACITY};

/// Value left in an attribute slot whose stage did not run.
pub const NOT_COMPUTED: f32 = -1.0;

/// Per-face results of the last `detect_and_track` call. Index `i` of every
/// sequence refers to the same tracked face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingCache {
    records: Vec<FaceRecordBytes>,
    track_ids: Vec<i32>,
    rects: Vec<FaceRect>,
    quality: Vec<PoseQuality>,
    roll: Vec<f32>,
    yaw: Vec<f32>,
    pitch: Vec<f32>,
}

impl TrackingCache {
    /// Build the cache for one frame's tracker output, in tracker order.
    pub fn from_faces(faces: &[TrackedFace]) -> Self {
        let mut cache = Self::with_capacity(faces.len());
        for (i, face) in faces.iter().enumerate() {
            let record = FaceRecord::from_tracked(face, i as i32);
            cache.records.push(codec::encode(&record));
            cache.track_ids.push(face.track_id);
            cache.rects.push(record.rect);
            cache.quality.push(face.quality);
            cache.roll.push(face.quality.roll);
            cache.yaw.push(face.quality.yaw);
            cache.pitch.push(face.quality.pitch);
        }
        cache
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            records: Vec::with_capacity(n),
            track_ids: Vec::with_capacity(n),
            rects: Vec::with_capacity(n),
            quality: Vec::with_capacity(n),
            roll: Vec::with_capacity(n),
            yaw: Vec::with_capacity(n),
            pitch: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encoded face records ("face basic data") handed to callers.
    pub fn records(&self) -> &[FaceRecordBytes] {
        &self.records
    }

    pub fn track_ids(&self) -> &[i32] {
        &self.track_ids
    }

    pub fn rects(&self) -> &[FaceRect] {
        &self.rects
    }

    pub fn quality(&self) -> &[PoseQuality] {
        &self.quality
    }

    pub fn roll(&self) -> &[f32] {
        &self.roll
    }

    pub fn yaw(&self) -> &[f32] {
        &self.yaw
    }

    pub fn pitch(&self) -> &[f32] {
        &self.pitch
    }
}

/// Attribute scores of the last `faces_process` call, aligned to its input list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeCache {
    pub liveness: Vec<f32>,
    pub mask: Vec<f32>,
    pub age: Vec<f32>,
    pub gender: Vec<f32>,
}

impl AttributeCache {
    /// `n` slots per attribute, all [`NOT_COMPUTED`].
    pub fn sized(n: usize) -> Self {
        Self {
            liveness: vec![NOT_COMPUTED; n],
            mask: vec![NOT_COMPUTED; n],
            age: vec![NOT_COMPUTED; n],
            gender: vec![NOT_COMPUTED; n],
        }
    }

    pub fn len(&self) -> usize {
        self.liveness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.liveness.is_empty()
    }
}

/// Every result a session exposes between calls.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    pub(crate) tracking: TrackingCache,
    pub(crate) attributes: AttributeCache,
    /// Embedding from the last extraction.
    pub(crate) extracted: Embedding,
    /// Embedding of the last searched or fetched gallery record.
    pub(crate) searched: Embedding,
    /// Tag of the last searched or fetched gallery record.
    pub(crate) tag: OutputTag<TAG_CAPACITY>,
}

impl ResultCache {
    pub fn tracking(&self) -> &TrackingCache {
        &self.tracking
    }

    pub fn attributes(&self) -> &AttributeCache {
        &self.attributes
    }

    pub fn extracted(&self) -> &Embedding {
        &self.extracted
    }

    pub fn searched(&self) -> &Embedding {
        &self.searched
    }

    pub fn tag(&self) -> &OutputTag<TAG_CAPACITY> {
        &self.tag
    }
}

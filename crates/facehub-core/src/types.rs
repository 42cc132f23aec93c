use serde::{Deserialize, Serialize};

/// Number of facial keypoints carried by every face record.
pub const KEYPOINT_COUNT: usize = 5;

/// Integer pixel rectangle of a tracked face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

/// Head pose and per-keypoint quality reported by the tracker.
///
/// Keypoint order: [left_eye, right_eye, nose, left_mouth, right_mouth].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseQuality {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub landmarks: [Point2f; KEYPOINT_COUNT],
    /// Occlusion-style score per keypoint; lower is better.
    pub landmark_quality: [f32; KEYPOINT_COUNT],
}

/// One face as yielded by a [`Tracker`](crate::capability::Tracker) for a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedFace {
    pub track_id: i32,
    pub rect: FaceRect,
    pub detect_score: f32,
    pub keypoints: [Point2f; KEYPOINT_COUNT],
    pub quality: PoseQuality,
}

/// A detected face at one instant, in the shape that crosses the session boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub track_id: i32,
    /// Position of the face in the tracker output for its frame.
    pub face_index: i32,
    pub rect: FaceRect,
    pub detect_score: f32,
    pub keypoints: [Point2f; KEYPOINT_COUNT],
    pub roll: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub quality: [f32; KEYPOINT_COUNT],
}

impl FaceRecord {
    pub fn from_tracked(face: &TrackedFace, face_index: i32) -> Self {
        Self {
            track_id: face.track_id,
            face_index,
            rect: face.rect,
            detect_score: face.detect_score,
            keypoints: face.keypoints,
            roll: face.quality.roll,
            yaw: face.quality.yaw,
            pitch: face.quality.pitch,
            quality: face.quality.landmark_quality,
        }
    }

    /// Overall quality in [0, 1]: one minus the mean keypoint occlusion score.
    pub fn quality_score(&self) -> f32 {
        let sum: f32 = self.quality.iter().sum();
        1.0 - sum / KEYPOINT_COUNT as f32
    }
}

/// Face embedding vector. Dimensionality is fixed by the recognizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// A zero-norm operand yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// A durable identity entry in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub custom_id: i32,
    pub tag: String,
    pub embedding: Embedding,
}

/// Outcome of a similarity query against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Store index of the reported record, `None` when nothing is reported.
    pub index: Option<usize>,
    pub custom_id: Option<i32>,
    /// Cosine similarity of the best candidate [-1, 1], 0.0 for an empty gallery.
    pub score: f32,
    /// Tag of the reported record, empty when nothing is reported.
    pub tag: String,
}

impl SearchResult {
    pub fn no_match(score: f32) -> Self {
        Self {
            index: None,
            custom_id: None,
            score,
            tag: String::new(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(emb(&[1.0, 0.0]).similarity(&emb(&[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((emb(&[1.0, 0.0]).similarity(&emb(&[-1.0, 0.0])) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = emb(&[3.0, 4.0]);
        let b = emb(&[0.6, 0.8]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(emb(&[0.0, 0.0]).similarity(&emb(&[1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_record_from_tracked_copies_pose_and_quality() {
        let face = TrackedFace {
            track_id: 7,
            rect: FaceRect { x: 1, y: 2, width: 30, height: 40 },
            detect_score: 0.88,
            keypoints: [Point2f { x: 5.0, y: 6.0 }; KEYPOINT_COUNT],
            quality: PoseQuality {
                pitch: 1.5,
                yaw: -2.5,
                roll: 3.5,
                landmarks: [Point2f::default(); KEYPOINT_COUNT],
                landmark_quality: [0.1, 0.2, 0.3, 0.4, 0.5],
            },
        };

        let record = FaceRecord::from_tracked(&face, 3);
        assert_eq!(record.track_id, 7);
        assert_eq!(record.face_index, 3);
        assert_eq!(record.rect, face.rect);
        assert_eq!(record.pitch, 1.5);
        assert_eq!(record.yaw, -2.5);
        assert_eq!(record.roll, 3.5);
        assert_eq!(record.quality, [0.1, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_quality_score_is_inverted_mean() {
        let record = FaceRecord {
            quality: [0.2, 0.2, 0.2, 0.2, 0.2],
            ..FaceRecord::default()
        };
        assert!((record.quality_score() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_search_result_no_match() {
        let r = SearchResult::no_match(0.3);
        assert!(!r.is_match());
        assert!(r.tag.is_empty());
        assert_eq!(r.custom_id, None);
    }

    #[test]
    fn test_feature_record_json_shape() {
        let record = FeatureRecord {
            custom_id: 3,
            tag: "alice".into(),
            embedding: Embedding::new(vec![0.5, 1.0]),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"custom_id": 3, "tag": "alice", "embedding": [0.5, 1.0]}));
    }
}

//! facehub-core: Face records, the feature gallery and its SQLite mirror.
//!
//! Detection, recognition and attribute inference are consumed through the
//! traits in [`capability`]; this crate owns the data they exchange.

pub mod capability;
pub mod codec;
pub mod frame;
pub mod output_tag;
pub mod persistence;
pub mod sqlite;
pub mod store;
pub mod types;

pub use capability::{
    AttributePipeline, AttributeStage, CapabilityError, ModelArchive, ModelLoader, PipelineParams,
    Recognizer, Tracker,
};
pub use codec::{CodecError, FaceRecordBytes};
pub use frame::{Frame, PixelFormat, Rotation};
pub use output_tag::{OutputTag, TAG_CAPACITY};
pub use persistence::{PersistenceBackend, PersistenceError};
pub use sqlite::SqliteBackend;
pub use store::{FeatureStore, PrimaryKeyMode, SearchMode, StoreError};
pub use types::{
    Embedding, FaceRecord, FaceRect, FeatureRecord, Point2f, PoseQuality, SearchResult, TrackedFace,
    KEYPOINT_COUNT,
};

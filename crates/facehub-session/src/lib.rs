//! facehub-session: Per-session orchestration of tracking, attribute
//! inference, recognition and the feature gallery.
//!
//! [`SessionContext`] is the synchronous facade; [`SessionHandle`] moves one
//! onto its own thread for async callers.

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;

#[cfg(test)]
mod testing;

pub use cache::{AttributeCache, ResultCache, TrackingCache, NOT_COMPUTED};
pub use config::{DatabaseConfiguration, DetectMode, FeatureHubConfig, SessionConfig};
pub use context::{FeatureView, SessionContext};
pub use engine::{HandleError, SessionHandle};
pub use error::{result_code, ErrorKind, SessionError, SUCCESS_CODE};

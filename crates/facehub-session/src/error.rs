use facehub_core::{CapabilityError, CodecError, PersistenceError, StoreError};
use thiserror::Error;

/// Result code for success at an integer boundary.
pub const SUCCESS_CODE: i32 = 0;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to load model archive {path}: {reason}")]
    ArchiveLoad { path: String, reason: String },
    #[error("session is not configured")]
    NotConfigured,
    #[error("no tracker is bound; configure the session first")]
    TrackerUnavailable,
    #[error("recognition is disabled for this session")]
    RecognizerUnavailable,
    #[error("persistence is disabled for this session")]
    PersistenceDisabled,
    #[error("persistence is already configured for this session")]
    PersistenceAlreadyConfigured,
    #[error("custom id {0} already exists")]
    IdAlreadyExists(i32),
    #[error("custom id {0} is not in the gallery")]
    InvalidIndex(i32),
    #[error("embedding has {actual} dimensions, gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding is empty")]
    EmptyEmbedding,
    #[error("invalid face record: {0}")]
    InvalidFaceRecord(#[from] CodecError),
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("tracker: {0}")]
    Tracker(CapabilityError),
    #[error("recognizer: {0}")]
    Recognizer(CapabilityError),
    #[error("attribute pipeline: {0}")]
    Pipeline(CapabilityError),
}

/// Coarse classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotReady,
    Identity,
    InvalidInput,
    Persistence,
    Collaborator,
}

impl ErrorKind {
    /// True when the session stays unusable until it is configured again.
    pub fn requires_reconfigure(self) -> bool {
        matches!(self, ErrorKind::Configuration | ErrorKind::NotReady)
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::ArchiveLoad { .. } => ErrorKind::Configuration,
            SessionError::NotConfigured
            | SessionError::TrackerUnavailable
            | SessionError::RecognizerUnavailable
            | SessionError::PersistenceDisabled => ErrorKind::NotReady,
            SessionError::IdAlreadyExists(_) | SessionError::InvalidIndex(_) => ErrorKind::Identity,
            SessionError::InvalidParameter(_)
            | SessionError::PersistenceAlreadyConfigured
            | SessionError::DimensionMismatch { .. }
            | SessionError::EmptyEmbedding
            | SessionError::InvalidFaceRecord(_) => ErrorKind::InvalidInput,
            SessionError::Persistence(_) => ErrorKind::Persistence,
            SessionError::Tracker(_) | SessionError::Recognizer(_) | SessionError::Pipeline(_) => {
                ErrorKind::Collaborator
            }
        }
    }

    /// Stable integer code. Collaborator failures keep the collaborator's own code.
    pub fn code(&self) -> i32 {
        match self {
            SessionError::InvalidParameter(_) => 1,
            SessionError::ArchiveLoad { .. } => 1001,
            SessionError::NotConfigured => 1101,
            SessionError::TrackerUnavailable => 1102,
            SessionError::RecognizerUnavailable => 1103,
            SessionError::PersistenceDisabled => 1104,
            SessionError::PersistenceAlreadyConfigured => 1105,
            SessionError::IdAlreadyExists(_) => 1201,
            SessionError::InvalidIndex(_) => 1202,
            SessionError::DimensionMismatch { .. } => 1203,
            SessionError::EmptyEmbedding => 1204,
            SessionError::InvalidFaceRecord(_) => 1205,
            SessionError::Persistence(_) => 1301,
            SessionError::Tracker(e) | SessionError::Recognizer(e) | SessionError::Pipeline(e) => {
                if e.code != SUCCESS_CODE { e.code } else { 1400 }
            }
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::IdAlreadyExists(id) => SessionError::IdAlreadyExists(id),
            StoreError::InvalidIndex(id) => SessionError::InvalidIndex(id),
            StoreError::DimensionMismatch { expected, actual } => {
                SessionError::DimensionMismatch { expected, actual }
            }
            StoreError::EmptyEmbedding => SessionError::EmptyEmbedding,
            StoreError::NoBackend => SessionError::PersistenceDisabled,
            StoreError::KeyModeLocked | StoreError::KeysExhausted => {
                SessionError::InvalidParameter(e.to_string())
            }
            StoreError::Persistence(e) => SessionError::Persistence(e),
        }
    }
}

/// Integer result for a boundary caller: [`SUCCESS_CODE`] or the error's code.
pub fn result_code<T>(result: &Result<T, SessionError>) -> i32 {
    match result {
        Ok(_) => SUCCESS_CODE,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_code_passes_through() {
        let err = SessionError::Pipeline(CapabilityError::new(-42, "mask model failed"));
        assert_eq!(err.code(), -42);
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert!(!err.kind().requires_reconfigure());
    }

    #[test]
    fn test_collaborator_success_code_is_not_reported_as_success() {
        let err = SessionError::Tracker(CapabilityError::new(SUCCESS_CODE, "bogus"));
        assert_ne!(err.code(), SUCCESS_CODE);
    }

    #[test]
    fn test_store_errors_map_to_identity() {
        let dup: SessionError = StoreError::IdAlreadyExists(5).into();
        assert!(matches!(dup, SessionError::IdAlreadyExists(5)));
        assert_eq!(dup.kind(), ErrorKind::Identity);

        let missing: SessionError = StoreError::InvalidIndex(6).into();
        assert_eq!(missing.code(), 1202);
    }

    #[test]
    fn test_key_mode_errors_are_invalid_parameters() {
        let locked: SessionError = StoreError::KeyModeLocked.into();
        assert!(matches!(locked, SessionError::InvalidParameter(_)));
        assert_eq!(locked.code(), 1);
    }

    #[test]
    fn test_not_ready_requires_reconfigure() {
        assert!(SessionError::TrackerUnavailable.kind().requires_reconfigure());
        assert!(SessionError::ArchiveLoad {
            path: "x".into(),
            reason: "y".into()
        }
        .kind()
        .requires_reconfigure());
        assert!(!SessionError::InvalidIndex(1).kind().requires_reconfigure());
    }

    #[test]
    fn test_result_code() {
        assert_eq!(result_code::<()>(&Ok(())), SUCCESS_CODE);
        assert_eq!(result_code::<()>(&Err(SessionError::NotConfigured)), 1101);
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            SessionError::InvalidParameter(String::new()),
            SessionError::ArchiveLoad { path: String::new(), reason: String::new() },
            SessionError::NotConfigured,
            SessionError::TrackerUnavailable,
            SessionError::RecognizerUnavailable,
            SessionError::PersistenceDisabled,
            SessionError::PersistenceAlreadyConfigured,
            SessionError::IdAlreadyExists(0),
            SessionError::InvalidIndex(0),
            SessionError::DimensionMismatch { expected: 1, actual: 2 },
            SessionError::EmptyEmbedding,
            SessionError::InvalidFaceRecord(CodecError::BadMagic),
            SessionError::Persistence(PersistenceError::NotFound(0)),
        ];
        let mut codes: Vec<i32> = errors.iter().map(SessionError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}

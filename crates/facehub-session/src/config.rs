use crate::error::SessionError;
use facehub_core::sqlite::DB_FILE_NAME;
use facehub_core::{PipelineParams, PrimaryKeyMode, SearchMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default cosine similarity threshold for a positive gallery match.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.42;
pub const DEFAULT_MAX_DETECT_FACES: usize = 5;

/// How the tracker treats consecutive frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectMode {
    /// Every frame is an independent image; always redetect.
    #[default]
    Image,
    /// Frames form a stream; the tracker may carry identities across frames.
    Stream,
}

impl DetectMode {
    pub fn always_detect(self) -> bool {
        matches!(self, DetectMode::Image)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Some(DetectMode::Image),
            "stream" | "video" => Some(DetectMode::Stream),
            _ => None,
        }
    }
}

/// How the feature gallery assigns ids and answers searches.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeatureHubConfig {
    pub primary_key_mode: PrimaryKeyMode,
    pub search_mode: SearchMode,
    /// Cosine similarity threshold for a positive gallery match.
    pub search_threshold: f32,
    /// Report the best candidate even when it misses the threshold.
    pub search_most_similar: bool,
}

impl Default for FeatureHubConfig {
    fn default() -> Self {
        Self {
            primary_key_mode: PrimaryKeyMode::default(),
            search_mode: SearchMode::default(),
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
            search_most_similar: false,
        }
    }
}

/// Whether the gallery is mirrored to disk, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfiguration {
    pub enable_persistence: bool,
    /// Database file, or a directory that will hold [`DB_FILE_NAME`].
    pub db_path: PathBuf,
}

impl DatabaseConfiguration {
    pub fn persistent(db_path: impl Into<PathBuf>) -> Self {
        Self {
            enable_persistence: true,
            db_path: db_path.into(),
        }
    }

    /// Concrete database file for `db_path`.
    pub fn database_file(&self) -> PathBuf {
        if self.db_path.is_dir() {
            self.db_path.join(DB_FILE_NAME)
        } else {
            self.db_path.clone()
        }
    }
}

/// Session configuration, loaded from an optional TOML file and `FACEHUB_*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Model archive to load at configuration.
    pub model_path: PathBuf,
    pub detect_mode: DetectMode,
    pub max_detect_faces: usize,
    pub pipeline: PipelineParams,
    pub feature_hub: FeatureHubConfig,
    pub track_preview_size: Option<i32>,
    pub database: DatabaseConfiguration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            detect_mode: DetectMode::default(),
            max_detect_faces: DEFAULT_MAX_DETECT_FACES,
            pipeline: PipelineParams::default(),
            feature_hub: FeatureHubConfig::default(),
            track_preview_size: None,
            database: DatabaseConfiguration::default(),
        }
    }
}

impl SessionConfig {
    /// Read `path` (if any) as TOML, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SessionError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidParameter(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        toml::from_str(text).map_err(|e| SessionError::InvalidParameter(format!("bad config: {e}")))
    }

    /// Apply `FACEHUB_*` overrides read through `lookup`. Unparsable values are ignored.
    ///
    /// Flags accept `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("FACEHUB_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(mode) = lookup("FACEHUB_DETECT_MODE").and_then(|v| DetectMode::parse(&v)) {
            self.detect_mode = mode;
        }
        self.max_detect_faces = parsed(&lookup, "FACEHUB_MAX_DETECT_FACES", self.max_detect_faces);
        let hub = &mut self.feature_hub;
        if let Some(mode) = lookup("FACEHUB_PRIMARY_KEY_MODE").and_then(|v| parse_key_mode(&v)) {
            hub.primary_key_mode = mode;
        }
        if let Some(mode) = lookup("FACEHUB_SEARCH_MODE").and_then(|v| parse_search_mode(&v)) {
            hub.search_mode = mode;
        }
        hub.search_threshold = parsed(&lookup, "FACEHUB_SEARCH_THRESHOLD", hub.search_threshold);
        if let Some(flag) = lookup("FACEHUB_SEARCH_MOST_SIMILAR").and_then(|v| parse_flag(&v)) {
            hub.search_most_similar = flag;
        }
        if let Some(flag) = lookup("FACEHUB_ENABLE_PERSISTENCE").and_then(|v| parse_flag(&v)) {
            self.database.enable_persistence = flag;
        }
        if let Some(v) = lookup("FACEHUB_DB_PATH") {
            self.database.db_path = PathBuf::from(v);
        }
        self
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_key_mode(s: &str) -> Option<PrimaryKeyMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "manual" => Some(PrimaryKeyMode::Manual),
        "auto" | "auto_increment" => Some(PrimaryKeyMode::AutoIncrement),
        _ => None,
    }
}

fn parse_search_mode(s: &str) -> Option<SearchMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "exhaustive" => Some(SearchMode::Exhaustive),
        "eager" => Some(SearchMode::Eager),
        _ => None,
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.detect_mode, DetectMode::Image);
        assert_eq!(config.max_detect_faces, DEFAULT_MAX_DETECT_FACES);
        assert!((config.feature_hub.search_threshold - 0.42).abs() < 1e-6);
        assert_eq!(config.feature_hub.primary_key_mode, PrimaryKeyMode::Manual);
        assert_eq!(config.feature_hub.search_mode, SearchMode::Exhaustive);
        assert!(!config.database.enable_persistence);
    }

    #[test]
    fn test_detect_mode_always_detect() {
        assert!(DetectMode::Image.always_detect());
        assert!(!DetectMode::Stream.always_detect());
    }

    #[test]
    fn test_from_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            model_path = "/opt/models/pack"
            detect_mode = "stream"
            max_detect_faces = 10

            [pipeline]
            enable_recognition = true
            enable_mask_detect = true

            [feature_hub]
            primary_key_mode = "auto_increment"
            search_mode = "eager"
            search_threshold = 0.6

            [database]
            enable_persistence = true
            db_path = "/var/lib/facehub"
            "#,
        )
        .unwrap();

        assert_eq!(config.model_path, PathBuf::from("/opt/models/pack"));
        assert_eq!(config.detect_mode, DetectMode::Stream);
        assert_eq!(config.max_detect_faces, 10);
        assert!(config.pipeline.enable_recognition);
        assert!(config.pipeline.enable_mask_detect);
        assert!(!config.pipeline.enable_liveness);
        assert!(config.database.enable_persistence);
        assert_eq!(config.feature_hub.primary_key_mode, PrimaryKeyMode::AutoIncrement);
        assert_eq!(config.feature_hub.search_mode, SearchMode::Eager);
        assert!((config.feature_hub.search_threshold - 0.6).abs() < 1e-6);
        assert!(!config.feature_hub.search_most_similar);
    }

    #[test]
    fn test_bad_toml_is_invalid_parameter() {
        let err = SessionConfig::from_toml_str("max_detect_faces = \"many\"").unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::default().with_env_overrides(env(&[
            ("FACEHUB_DETECT_MODE", "STREAM"),
            ("FACEHUB_MAX_DETECT_FACES", "3"),
            ("FACEHUB_SEARCH_THRESHOLD", "0.75"),
            ("FACEHUB_SEARCH_MOST_SIMILAR", "1"),
            ("FACEHUB_ENABLE_PERSISTENCE", "1"),
            ("FACEHUB_DB_PATH", "/tmp/g.db"),
            ("FACEHUB_PRIMARY_KEY_MODE", "auto"),
            ("FACEHUB_SEARCH_MODE", "Eager"),
        ]));
        assert_eq!(config.detect_mode, DetectMode::Stream);
        assert_eq!(config.max_detect_faces, 3);
        assert!((config.feature_hub.search_threshold - 0.75).abs() < 1e-6);
        assert!(config.feature_hub.search_most_similar);
        assert_eq!(config.feature_hub.primary_key_mode, PrimaryKeyMode::AutoIncrement);
        assert_eq!(config.feature_hub.search_mode, SearchMode::Eager);
        assert!(config.database.enable_persistence);
        assert_eq!(config.database.db_path, PathBuf::from("/tmp/g.db"));
    }

    #[test]
    fn test_env_flags_accept_words() {
        let base = SessionConfig {
            feature_hub: FeatureHubConfig {
                search_most_similar: true,
                ..FeatureHubConfig::default()
            },
            database: DatabaseConfiguration::persistent("/tmp/g.db"),
            ..SessionConfig::default()
        };
        let off = base.clone().with_env_overrides(env(&[
            ("FACEHUB_SEARCH_MOST_SIMILAR", "false"),
            ("FACEHUB_ENABLE_PERSISTENCE", "off"),
        ]));
        assert!(!off.feature_hub.search_most_similar);
        assert!(!off.database.enable_persistence);

        let on = off.with_env_overrides(env(&[
            ("FACEHUB_SEARCH_MOST_SIMILAR", "Yes"),
            ("FACEHUB_ENABLE_PERSISTENCE", "true"),
        ]));
        assert!(on.feature_hub.search_most_similar);
        assert!(on.database.enable_persistence);

        let kept = base.with_env_overrides(env(&[("FACEHUB_ENABLE_PERSISTENCE", "maybe")]));
        assert!(kept.database.enable_persistence);
    }

    #[test]
    fn test_unparsable_env_keeps_previous_value() {
        let config = SessionConfig::default().with_env_overrides(env(&[
            ("FACEHUB_MAX_DETECT_FACES", "lots"),
            ("FACEHUB_DETECT_MODE", "sometimes"),
        ]));
        assert_eq!(config.max_detect_faces, DEFAULT_MAX_DETECT_FACES);
        assert_eq!(config.detect_mode, DetectMode::Image);
    }

    #[test]
    fn test_database_file_resolves_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = DatabaseConfiguration::persistent(dir.path());
        assert_eq!(db.database_file(), dir.path().join(DB_FILE_NAME));

        let file = DatabaseConfiguration::persistent(dir.path().join("custom.db"));
        assert_eq!(file.database_file(), dir.path().join("custom.db"));
    }
}

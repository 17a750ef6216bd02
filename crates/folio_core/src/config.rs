//! Core configuration surface.
//!
//! # Responsibility
//! - Describe database, cache and logging settings in one JSON document.
//! - Reject values the core cannot honor before anything is composed.
//!
//! # Invariants
//! - Every field has a default, so an empty object is a valid config.
//! - The cache namespace ends with `:` so kind prefixes never overlap.

use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CACHE_NAMESPACE: &str = "folio:cache:";
/// Entries kept by the in-memory store before least recently used ones are
/// evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
const DEFAULT_MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database file; `None` means an in-memory database.
    pub database_path: Option<PathBuf>,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Cache composition settings, fixed for the lifetime of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime; `None` keeps entries until invalidated.
    pub ttl_secs: Option<u64>,
    pub namespace: String,
    /// Entry limit of the in-memory store.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: None,
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    /// `capacity` as `NonZeroUsize`, clamped to 1.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files.
    pub dir: Option<PathBuf>,
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
            max_file_bytes: DEFAULT_MAX_LOG_FILE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl CoreConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let namespace = &self.cache.namespace;
        if namespace.is_empty() || !namespace.ends_with(':') {
            return Err(ConfigError::Invalid(format!(
                "cache.namespace must be non-empty and end with `:`, got `{namespace}`"
            )));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.namespace, DEFAULT_CACHE_NAMESPACE);
        assert_eq!(config.cache.ttl(), None);
        assert_eq!(config.cache.capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn cache_capacity_is_configurable_and_must_be_positive() {
        let config = CoreConfig::from_json_str(r#"{"cache": {"capacity": 64}}"#).unwrap();
        assert_eq!(config.cache.capacity_non_zero().get(), 64);

        let err = CoreConfig::from_json_str(r#"{"cache": {"capacity": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("capacity")));
    }

    #[test]
    fn partial_sections_are_merged_with_defaults() {
        let config = CoreConfig::from_json_str(
            r#"{"database_path": "/var/lib/folio/site.db", "cache": {"enabled": true, "ttl_secs": 30}}"#,
        )
        .unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(30)));
        assert_eq!(config.cache.namespace, DEFAULT_CACHE_NAMESPACE);
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/folio/site.db"))
        );
    }

    #[test]
    fn namespace_without_separator_is_rejected() {
        let err = CoreConfig::from_json_str(r#"{"cache": {"namespace": "folio"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("namespace")));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = CoreConfig::from_json_str(r#"{"logging": {"level": "loud"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = CoreConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}

//! Configuration
//!
//! Runtime settings read from `KURA_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::common::paths::default_content_dir;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("Source directory does not exist: {0:?}")]
    SourceMissing(PathBuf),

    #[error("Content directory must differ from the source directory ({0:?})")]
    SameDirectory(PathBuf),

    #[error("Failed to create content directory {path:?}: {source}")]
    ContentDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory watched for incoming packages
    pub source_dir: PathBuf,
    /// Directory holding canonical packages and the identifier map
    pub content_dir: PathBuf,
    pub settle_delay: Duration,
    /// Settle delay stays at zero this long after startup
    pub startup_grace: Duration,
    pub workers: usize,
    pub tick_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Settings {
    /// Defaults for everything except the source directory
    pub fn new(source_dir: PathBuf, content_dir: PathBuf) -> Self {
        Self {
            source_dir,
            content_dir,
            settle_delay: Duration::from_millis(3000),
            startup_grace: Duration::from_millis(3000),
            workers: 2,
            tick_interval: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_millis(10_000),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source_dir = get("KURA_SOURCE_DIR")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("KURA_SOURCE_DIR"))?;
        let content_dir = match get("KURA_CONTENT_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_content_dir().map_err(ConfigError::Other)?,
        };

        let mut settings = Self::new(source_dir, content_dir);

        if let Some(ms) = get("KURA_SETTLE_DELAY_MS") {
            settings.settle_delay = Duration::from_millis(parse_num("KURA_SETTLE_DELAY_MS", &ms)?);
        }
        if let Some(ms) = get("KURA_STARTUP_GRACE_MS") {
            settings.startup_grace = Duration::from_millis(parse_num("KURA_STARTUP_GRACE_MS", &ms)?);
        }
        if let Some(n) = get("KURA_WORKERS") {
            settings.workers = parse_num("KURA_WORKERS", &n)?;
        }
        if let Some(ms) = get("KURA_TICK_INTERVAL_MS") {
            settings.tick_interval = Duration::from_millis(parse_num("KURA_TICK_INTERVAL_MS", &ms)?);
        }
        if let Some(ms) = get("KURA_SHUTDOWN_TIMEOUT_MS") {
            settings.shutdown_timeout =
                Duration::from_millis(parse_num("KURA_SHUTDOWN_TIMEOUT_MS", &ms)?);
        }

        Ok(settings)
    }

    /// Check invariants and create the content directory if needed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                name: "KURA_WORKERS",
                value: "0".to_string(),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "KURA_TICK_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        if !self.source_dir.is_dir() {
            return Err(ConfigError::SourceMissing(self.source_dir.clone()));
        }

        std::fs::create_dir_all(&self.content_dir).map_err(|source| ConfigError::ContentDir {
            path: self.content_dir.clone(),
            source,
        })?;

        let same = match (self.source_dir.canonicalize(), self.content_dir.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.source_dir == self.content_dir,
        };
        if same {
            return Err(ConfigError::SameDirectory(self.content_dir.clone()));
        }

        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("KURA_SOURCE_DIR", "/drop"),
            ("KURA_CONTENT_DIR", "/srv/contents"),
        ]))
        .unwrap();

        assert_eq!(settings.content_dir, PathBuf::from("/srv/contents"));
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.tick_interval, Duration::from_secs(1));
        assert_eq!(settings.settle_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("KURA_SOURCE_DIR", "/drop"),
            ("KURA_CONTENT_DIR", "/srv/contents"),
            ("KURA_SETTLE_DELAY_MS", "250"),
            ("KURA_WORKERS", "4"),
            ("KURA_SHUTDOWN_TIMEOUT_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(settings.settle_delay, Duration::from_millis(250));
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.shutdown_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_missing_source_dir() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KURA_SOURCE_DIR")));
    }

    #[test]
    fn test_bad_number() {
        let err = Settings::from_lookup(lookup(&[
            ("KURA_SOURCE_DIR", "/drop"),
            ("KURA_CONTENT_DIR", "/srv"),
            ("KURA_WORKERS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "KURA_WORKERS", .. }));
    }

    #[test]
    fn test_validate_rejects_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        assert!(matches!(settings.validate(), Err(ConfigError::SameDirectory(_))));
    }

    #[test]
    fn test_validate_creates_content_dir() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("contents");
        let settings = Settings::new(dir.path().to_path_buf(), content.clone());
        settings.validate().unwrap();
        assert!(content.is_dir());
    }
}

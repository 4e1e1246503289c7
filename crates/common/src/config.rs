//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`QueueConfig::max_concurrency`].
pub const MAX_CONCURRENCY_ENV: &str = "MAX_CONCURRENCY";

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the task database, uploads, and outputs.
    pub data_dir: PathBuf,

    /// Task queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Task queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of conversions allowed to run at the same time.
    pub max_concurrency: usize,

    /// Largest accepted source video, in bytes.
    pub max_source_bytes: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "longshot=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            max_source_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(&config_file_path());
        config.apply_concurrency_override(std::env::var(MAX_CONCURRENCY_ENV).ok().as_deref());
        config
    }

    /// Load config from an explicit file, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit file.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Apply a `MAX_CONCURRENCY` value. Unparseable or zero values are
    /// ignored with a warning.
    pub fn apply_concurrency_override(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else {
            return;
        };
        match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => self.queue.max_concurrency = n,
            _ => tracing::warn!(
                value = raw,
                "Ignoring invalid {MAX_CONCURRENCY_ENV}; keeping {}",
                self.queue.max_concurrency
            ),
        }
    }

    /// SQLite task database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("tasks.db")
    }

    /// Where submitted source videos are staged until processed.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Where sealed screenshots are written.
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("longshot").join("config.json")
}

/// Default data directory.
fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("longshot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.queue.max_concurrency, 2);
        assert_eq!(config.queue.max_source_bytes, 100 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert!(config.database_path().ends_with("tasks.db"));
    }

    #[test]
    fn test_concurrency_override() {
        let mut config = AppConfig::default();
        config.apply_concurrency_override(Some("6"));
        assert_eq!(config.queue.max_concurrency, 6);

        config.apply_concurrency_override(Some("0"));
        assert_eq!(config.queue.max_concurrency, 6);

        config.apply_concurrency_override(Some("lots"));
        assert_eq!(config.queue.max_concurrency, 6);

        config.apply_concurrency_override(None);
        assert_eq!(config.queue.max_concurrency, 6);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.data_dir = dir.path().join("data");
        config.queue.max_concurrency = 4;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.data_dir, config.data_dir);
        assert_eq!(loaded.queue.max_concurrency, 4);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_dir":"/srv/longshot"}"#).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.data_dir, PathBuf::from("/srv/longshot"));
        assert_eq!(loaded.queue.max_concurrency, 2);
        assert!(!loaded.logging.json);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.queue.max_concurrency, 2);
    }
}

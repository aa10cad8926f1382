//! Configuration management for kao.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "kao";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// User-Agent sent with every page and image request.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:50.0) Gecko/20100101 Firefox/50.0";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File paths.
    pub paths: PathsConfig,

    /// Web scraping settings.
    pub scraping: ScrapingConfig,

    /// Per-chapter retry policy.
    pub retry: RetryConfig,

    /// Accepted image dimensions.
    pub images: ImageBoundsConfig,
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the `<platform>/<series>/<chapter>` tree.
    pub downloads_directory: PathBuf,

    /// Append-only run log, truncated at startup.
    pub log_file: PathBuf,

    /// Links file read by `--read-file` when no path is given.
    pub default_links_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_directory: PathBuf::from("downloads"),
            log_file: PathBuf::from("kao.log"),
            default_links_file: PathBuf::from("list url.txt"),
        }
    }
}

/// Web scraping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Delay before every page request in seconds.
    pub delay_between_requests_sec: f64,

    /// Timeout applied to every HTTP request in seconds.
    pub request_timeout_sec: u64,

    /// Number of images of one chapter fetched concurrently.
    pub image_workers: usize,

    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_sec: 1.0,
            request_timeout_sec: 30,
            image_workers: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScrapingConfig {
    /// Returns the request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

/// Retry policy for chapter attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per chapter, the first one included.
    pub max_attempts: u32,

    /// Pause between two attempts of the same chapter in seconds.
    pub delay_sec: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay_sec: 0.0,
        }
    }
}

/// Dimension bounds an image must satisfy to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageBoundsConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ImageBoundsConfig {
    fn default() -> Self {
        Self {
            min_width: 10,
            min_height: 10,
            max_width: 144_000,
            max_height: 144_000,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from a specific path.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be greater than 0"));
        }

        if self.scraping.image_workers == 0 {
            return Err(invalid("scraping.image_workers", "must be greater than 0"));
        }

        if self.scraping.request_timeout_sec == 0 {
            return Err(invalid(
                "scraping.request_timeout_sec",
                "must be greater than 0",
            ));
        }

        let delays = [
            ("scraping.delay_between_requests_sec", self.scraping.delay_between_requests_sec),
            ("retry.delay_sec", self.retry.delay_sec),
        ];
        for (key, delay) in delays {
            if !delay.is_finite() || delay < 0.0 {
                return Err(invalid(key, "must be a finite, non-negative number of seconds"));
            }
        }

        let bounds = &self.images;
        if bounds.min_width > bounds.max_width || bounds.min_height > bounds.max_height {
            return Err(invalid("images", "minimum bounds exceed maximum bounds"));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.images.min_width, 10);
        assert_eq!(config.images.max_height, 144_000);
        assert_eq!(config.paths.downloads_directory, PathBuf::from("downloads"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.scraping.image_workers = 7;
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.scraping.image_workers, 7);
        assert_eq!(loaded.scraping.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 2\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.scraping.image_workers, 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scraping.image_workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.images.min_width = 500;
        config.images.max_width = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("images"));
    }

    #[test]
    fn test_non_finite_delays_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[retry]\ndelay_sec = inf\n").unwrap();
        let err = Config::load_from(&path).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("retry.delay_sec"));

        std::fs::write(&path, "[scraping]\ndelay_between_requests_sec = nan\n").unwrap();
        let err = Config::load_from(&path).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("scraping.delay_between_requests_sec"));

        let mut config = Config::default();
        config.retry.delay_sec = -1.0;
        assert!(config.validate().is_err());
        config.retry.delay_sec = 2.5;
        assert!(config.validate().is_ok());
    }
}

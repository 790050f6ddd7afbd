//! Configuration loading
//!
//! Settings come from a TOML file in the platform config directory (or an
//! explicit path). Every field has a default, so a missing file is fine.

use crate::resolver::KINOBD_API_URL;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `tmdb.api_key`
pub const TMDB_API_KEY_ENV: &str = "STREAMX_TMDB_API_KEY";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where accounts and watchlists are stored; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Upper bound for every catalog request
    pub request_timeout_secs: u64,
    pub kinobd: KinoBdConfig,
    pub tmdb: TmdbConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KinoBdConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub base_url: String,
    pub image_base_url: String,
    pub api_key: Option<String>,
    pub language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            request_timeout_secs: 15,
            kinobd: KinoBdConfig::default(),
            tmdb: TmdbConfig::default(),
        }
    }
}

impl Default for KinoBdConfig {
    fn default() -> Self {
        Self {
            base_url: KINOBD_API_URL.to_string(),
        }
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            image_base_url: "https://image.tmdb.org/t/p".to_string(),
            api_key: None,
            language: "ru-RU".to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration
    ///
    /// With an explicit path the file must exist. Otherwise the default
    /// location is used when present and defaults apply when it is not.
    /// `STREAMX_TMDB_API_KEY` wins over the file's API key.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(key) = std::env::var(TMDB_API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.tmdb.api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Parses a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// `<config dir>/config.toml` for this application
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("app", "streamx", "streamx")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "request_timeout_secs = 5\n\n[tmdb]\napi_key = \"abc\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.tmdb.api_key.as_deref(), Some("abc"));
        assert_eq!(config.tmdb.language, "ru-RU");
        assert_eq!(config.kinobd.base_url, KINOBD_API_URL);
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_secs = \"soon\"").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}

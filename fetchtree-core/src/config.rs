//! Configuration management for fetchtree
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (FETCHTREE_*)
//! 3. Config file (~/.config/fetchtree/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Session storage and lifetime settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root folder holding one subfolder per session
    pub data_dir: PathBuf,

    /// Inactivity period after which a session is removed
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Git process settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitConfig {
    /// Path to the git executable
    pub git_path: String,

    /// Upper bound for a single clone or fetch
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            git_path: "git".to_string(),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Garbage collection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GcConfig {
    /// Period of the background sweep, on top of the per-change sweeps
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Session configuration
    pub sessions: SessionConfig,

    /// Git configuration
    pub git: GitConfig,

    /// Garbage collector configuration
    pub gc: GcConfig,
}

/// Default session data root
///
/// Returns `~/.cache/fetchtree/sessions`, or a relative `sessions` folder when
/// no cache directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("fetchtree").join("sessions"))
        .unwrap_or_else(|| PathBuf::from("sessions"))
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/fetchtree/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fetchtree").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - FETCHTREE_DATA_DIR: session data root
    /// - FETCHTREE_GIT_PATH: path to git executable
    /// - FETCHTREE_SESSION_MAX_AGE: session lifetime, e.g. "30m"
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("FETCHTREE_DATA_DIR") {
            self.sessions.data_dir = PathBuf::from(dir);
        }

        if let Ok(git_path) = std::env::var("FETCHTREE_GIT_PATH") {
            self.git.git_path = git_path;
        }

        if let Ok(max_age) = std::env::var("FETCHTREE_SESSION_MAX_AGE") {
            self.sessions.max_age = parse_duration(&max_age)?;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        git_path: Option<String>,
    ) -> Self {
        if let Some(dir) = data_dir {
            self.sessions.data_dir = dir;
        }

        if let Some(path) = git_path {
            self.git.git_path = path;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        data_dir: Option<PathBuf>,
        git_path: Option<String>,
    ) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()?
            .with_cli_overrides(data_dir, git_path))
    }
}

fn parse_duration(value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| Error::Config(format!("Invalid duration '{}': {}", value, e)))
}

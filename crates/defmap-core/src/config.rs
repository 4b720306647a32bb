//! Configuration schema (defmap.toml)

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// How DefMap builds are scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build independent crates in parallel during a full build
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Also use the parallel scheduler for incremental rebuild batches
    #[serde(default)]
    pub parallel_incremental: bool,

    /// Upper bound on worker threads, 0 = available parallelism
    #[serde(default)]
    pub max_workers: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_incremental: false,
            max_workers: 0,
        }
    }
}

impl BuildConfig {
    /// Sequential builds everywhere
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            parallel_incremental: false,
            max_workers: 1,
        }
    }

    /// Resolve the worker count for a batch of `batch_len` crates
    pub fn worker_count(&self, batch_len: usize) -> usize {
        let workers = match self.max_workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            n => n,
        };
        workers.min(batch_len).max(1)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

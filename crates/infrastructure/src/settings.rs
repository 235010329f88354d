//! Runtime configuration for the session store.
//!
//! Values come from `THREATMAP_*` environment variables:
//! - `THREATMAP_STORAGE_BACKEND`: `file` (default) or `memory`
//! - `THREATMAP_STORAGE_DIR`: directory holding `storage.json`
//!   (default: `<config dir>/threatmap`)
//! - `THREATMAP_SNAPSHOT_KEY`: key of the persisted session snapshot
//! - `THREATMAP_PERSIST_SNAPSHOT`: `true`/`false`
//! - `THREATMAP_LOG_LEVEL`: default tracing filter

use std::path::PathBuf;
use std::sync::Arc;

use ::config::{Config, Environment, Map};
use serde::Deserialize;
use threatmap_application::ports::KeyValueStorage;
use threatmap_domain::keys;

use crate::persistence::{FileStorage, MemoryStorage};

const ENV_PREFIX: &str = "THREATMAP";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value was missing or could not be parsed.
    #[error("invalid configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Could not determine the platform config directory.
    #[error("could not determine config directory")]
    NoConfigDir,
}

/// Which storage adapter backs the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file on disk.
    #[default]
    File,
    /// In-process only; nothing survives a restart.
    Memory,
}

/// Storage and logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Storage adapter.
    #[serde(default)]
    pub storage_backend: StorageBackend,

    /// Directory for the storage file. Falls back to the platform config dir.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Key of the persisted session snapshot.
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,

    /// Whether the persisted session snapshot is maintained.
    #[serde(default = "default_persist_snapshot")]
    pub persist_snapshot: bool,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_snapshot_key() -> String {
    keys::SNAPSHOT.to_string()
}

const fn default_persist_snapshot() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            storage_dir: None,
            snapshot_key: default_snapshot_key(),
            persist_snapshot: default_persist_snapshot(),
            log_level: default_log_level(),
        }
    }
}

impl StorageConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads configuration from an explicit variable map, as if it were the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable has an invalid value.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let config = Config::builder().add_source(environment).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Returns the directory holding the storage file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] when no directory is configured
    /// and the platform has no config directory.
    pub fn resolve_storage_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        dirs::config_dir()
            .map(|p| p.join("threatmap"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Builds the configured storage adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the file backend has no directory to live in.
    pub fn open_storage(&self) -> Result<Arc<dyn KeyValueStorage>, ConfigError> {
        Ok(match self.storage_backend {
            StorageBackend::File => Arc::new(FileStorage::in_dir(self.resolve_storage_dir()?)),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        })
    }
}

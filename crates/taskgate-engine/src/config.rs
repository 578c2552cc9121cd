//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Path resolution: explicit path, then `TASKGATE_CONFIG`, then
//! `<config_dir>/taskgate/config.toml`.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskgate_core::{DomainError, FocusConfig, RestrictedApp, RestrictionList, UnlockConfig};
use thiserror::Error;
use tracing::{debug, info};

use crate::poller::PollerConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "TASKGATE_CONFIG";

/// Default interval at which the CLI re-reads the task snapshot.
pub const DEFAULT_TASK_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid restricted app in config: {0}")]
    InvalidRestriction(#[from] DomainError),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub poll_interval_ms: u64,
    pub graceful_termination_first: bool,
    pub graceful_timeout_ms: u64,
    pub os_call_timeout_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        let defaults = PollerConfig::default();
        Self {
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            graceful_termination_first: defaults.graceful_termination_first,
            graceful_timeout_ms: defaults.graceful_timeout.as_millis() as u64,
            os_call_timeout_ms: defaults.os_call_timeout.as_millis() as u64,
        }
    }
}

impl PollerSettings {
    /// Converts to a runtime config, normalized like
    /// [`crate::RestrictionPoller::set_config`].
    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            graceful_termination_first: self.graceful_termination_first,
            graceful_timeout: Duration::from_millis(self.graceful_timeout_ms),
            os_call_timeout: Duration::from_millis(self.os_call_timeout_ms),
        }
        .normalized()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// How often the CLI re-reads the task snapshot file
    pub task_poll_interval_ms: u64,
    /// Seed the restriction list with the built-in presets
    pub include_presets: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            task_poll_interval_ms: DEFAULT_TASK_POLL_INTERVAL_MS,
            include_presets: true,
        }
    }
}

// ============================================================================
// Engine Config
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poller: PollerSettings,
    pub unlock: UnlockConfig,
    pub focus: FocusConfig,
    pub daemon: DaemonSettings,
    pub restricted_apps: Vec<RestrictedApp>,
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml(source: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        // Validate eagerly so a bad entry fails at load, not at session start
        config.restriction_list()?;
        Ok(config)
    }

    /// Loads a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(source) => {
                let config = Self::from_toml(&source, path)?;
                info!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Resolves the config path and loads it.
    pub fn load_resolved(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(&resolve_config_path(explicit))
    }

    /// Builds the restriction list: presets (if enabled) plus configured apps.
    ///
    /// # Errors
    /// Empty executable names and duplicate ids are rejected.
    pub fn restriction_list(&self) -> Result<RestrictionList, ConfigError> {
        let mut list = if self.daemon.include_presets {
            RestrictionList::with_presets()
        } else {
            RestrictionList::new()
        };

        for app in &self.restricted_apps {
            let mut app = app.clone();
            app.is_preset = false;
            list.add(app)?;
        }

        Ok(list)
    }

    pub fn poller_config(&self) -> PollerConfig {
        self.poller.to_poller_config()
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.task_poll_interval_ms.max(100))
    }
}

/// Resolves the config file path.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    default_config_path()
}

/// `<config_dir>/taskgate/config.toml`, falling back to `/tmp`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("taskgate")
        .join("config.toml")
}

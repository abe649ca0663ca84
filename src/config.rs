//! Configuration file handling
//!
//! The engine reads an optional TOML file. A missing default file is not an
//! error; every field falls back to its default.
//!
//! ```toml
//! [tools]
//! search_dirs = ["/opt/f3/bin"]
//! use_system_path = true
//!
//! [timeouts]
//! probe_ms = 2000
//! stop_grace_ms = 5000
//!
//! [defaults]
//! memory = "minimum"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::{OptionRegistry, RunOptions};

pub const CONFIG_ENV: &str = "F3_LAUNCHER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tools: ToolConfig,
    pub timeouts: TimeoutConfig,
    /// Initial option values, validated like any `set_option` call.
    pub defaults: BTreeMap<String, String>,
}

/// Where and under which names to look for the f3 executables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Searched before `PATH`, in order.
    pub search_dirs: Vec<PathBuf>,
    pub use_system_path: bool,
    pub write: String,
    pub read: String,
    pub probe: String,
    pub fix: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            use_system_path: true,
            write: "f3write".to_string(),
            read: "f3read".to_string(),
            probe: "f3probe".to_string(),
            fix: "f3fix".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for a `--version` probe.
    pub probe_ms: u64,
    /// How long a stopped tool gets to exit after SIGTERM before it is killed.
    pub stop_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe_ms: 2_000,
            stop_grace_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl EngineConfig {
    /// `$XDG_CONFIG_HOME/f3-launcher/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("f3-launcher").join("config.toml"))
    }

    /// Load from `explicit` if given (it must exist), otherwise from the
    /// default location when a file is there.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Build the initial option registry from `[defaults]`. Rejected entries
    /// are logged and skipped.
    pub fn option_registry(&self) -> OptionRegistry {
        let mut registry = OptionRegistry::new(RunOptions::default());
        for (key, value) in &self.defaults {
            if !registry.set_option(key, value) {
                tracing::warn!("Ignoring invalid default option {} = {}", key, value);
            }
        }
        registry
    }
}

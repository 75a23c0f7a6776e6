//! Configuration for the recovery tools.
//!
//! Values are layered, each layer overriding the previous one:
//! - built-in defaults
//! - a TOML file (`~/.config/reclaim/config.toml`, or an explicit path)
//! - `RECLAIM_*` environment variables
//! - command line flags (applied by the binary)
//!
//! Every value remembers which layer supplied it so `reclaim config` can
//! explain the effective settings.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser, expand_home};
pub use source::{ConfigSource, Sourced};

use crate::cleanup::CleanupMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid command_timeout in {}: '{value}'", path.display())]
    InvalidTimeout { path: PathBuf, value: String },

    #[error("Invalid environment configuration: {}", join_errors(.0))]
    Env(Vec<EnvError>),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// On-disk configuration file. All keys are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub projects_root: Option<PathBuf>,
    pub mode: Option<CleanupMode>,
    /// Humantime duration, e.g. `"10m"`. `"none"` disables the timeout.
    pub command_timeout: Option<String>,
    pub history_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective configuration with per-value provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimConfig {
    /// Directory holding every managed checkout. No default.
    pub projects_root: Sourced<Option<PathBuf>>,
    pub mode: Sourced<CleanupMode>,
    /// Upper bound on a single cleanup command. Unbounded by default.
    pub command_timeout: Sourced<Option<Duration>>,
    /// Retry ledger location. Without one, every recovery starts with an
    /// empty history.
    pub history_file: Sourced<Option<PathBuf>>,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            projects_root: Sourced::default_value(None),
            mode: Sourced::default_value(CleanupMode::default()),
            command_timeout: Sourced::default_value(None),
            history_file: Sourced::default_value(None),
        }
    }
}

/// One row of the effective configuration, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: ConfigSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ReclaimConfig {
    /// `~/.config/reclaim/config.toml` (platform config dir).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reclaim").join("config.toml"))
    }

    /// Load defaults, then the config file, then the environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let file_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|candidate| candidate.is_file()),
        };
        if let Some(file_path) = file_path {
            debug!(path = %file_path.display(), "Loading config file");
            let file = FileConfig::from_path(&file_path)?;
            config.apply_file(file, &file_path)?;
        }

        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig, path: &Path) -> Result<(), ConfigError> {
        let origin = path.display().to_string();

        if let Some(root) = file.projects_root {
            let root = expand_home(&root.to_string_lossy());
            self.projects_root = Sourced::from_file(Some(root), origin.clone());
        }
        if let Some(mode) = file.mode {
            self.mode = Sourced::from_file(mode, origin.clone());
        }
        if let Some(raw) = file.command_timeout {
            let timeout = match raw.trim().to_lowercase().as_str() {
                "" | "none" | "off" => None,
                value => Some(humantime::parse_duration(value).map_err(|_| {
                    ConfigError::InvalidTimeout {
                        path: path.to_path_buf(),
                        value: raw.clone(),
                    }
                })?),
            };
            self.command_timeout = Sourced::from_file(timeout, origin.clone());
        }
        if let Some(history) = file.history_file {
            let history = expand_home(&history.to_string_lossy());
            self.history_file = Sourced::from_file(Some(history), origin);
        }
        Ok(())
    }

    /// Overlay `RECLAIM_*` variables, reporting every invalid one at once.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut parser = EnvParser::new();

        let root = parser.get_optional_path("PROJECTS_ROOT");
        let mode = parser.get_parsed("MODE", self.mode.value, "enforce or dry-run");
        let timeout = parser.get_optional_duration("COMMAND_TIMEOUT", self.command_timeout.value);
        let history = parser.get_optional_path("HISTORY_FILE");

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }

        for (slot, value) in [(&mut self.projects_root, root), (&mut self.history_file, history)] {
            if value.source == ConfigSource::Environment {
                *slot = slot.clone().overlay(value);
            }
        }
        if mode.source == ConfigSource::Environment {
            self.mode = self.mode.clone().overlay(mode);
        }
        if timeout.source == ConfigSource::Environment {
            self.command_timeout = self.command_timeout.clone().overlay(timeout);
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<ConfigEntry> {
        fn entry<T>(key: &'static str, sourced: &Sourced<T>, value: String) -> ConfigEntry {
            ConfigEntry {
                key,
                value,
                source: sourced.source,
                origin: sourced.origin.clone(),
            }
        }

        let unset = || "<unset>".to_string();
        vec![
            entry(
                "projects_root",
                &self.projects_root,
                self.projects_root
                    .value
                    .as_ref()
                    .map_or_else(unset, |p| p.display().to_string()),
            ),
            entry("mode", &self.mode, self.mode.value.to_string()),
            entry(
                "command_timeout",
                &self.command_timeout,
                self.command_timeout
                    .value
                    .map_or_else(|| "none".to_string(), |d| humantime::format_duration(d).to_string()),
            ),
            entry(
                "history_file",
                &self.history_file,
                self.history_file
                    .value
                    .as_ref()
                    .map_or_else(unset, |p| p.display().to_string()),
            ),
        ]
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
}

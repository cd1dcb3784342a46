//! TOML-based application configuration.
//!
//! Stores tunables for:
//! - Reconciliation (remote timeout, retry budget, backoff)
//! - The study scheduler (default block granularity and session title)
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Per-call timeout for remote requests
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    /// Transport-error retries per change within one cycle
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles on every further attempt
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

/// Study scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_granularity_min")]
    pub default_granularity_min: u32,
    #[serde(default = "default_session_title")]
    pub default_session_title: String,
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

fn default_remote_timeout_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    200
}
fn default_granularity_min() -> u32 {
    30
}
fn default_session_title() -> String {
    "Study session".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_timeout_ms: default_remote_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_granularity_min: default_granularity_min(),
            default_session_title: default_session_title(),
        }
    }
}

impl SyncSettings {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| invalid("unknown config key".to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| invalid("unknown config key".to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?,
                    serde_json::Value::String(_) => serde_json::Value::String(value.to_string()),
                    _ => return Err(invalid("not a settable value".to_string())),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| invalid("unknown config key".to_string()))?;
        }

        Err(invalid("config key is empty".to_string()))
    }

    /// Default location, `<data_dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default configuration");
                Self::default()
            }
        }
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.remote_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sync.remote_timeout_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.scheduler.default_granularity_min == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.default_granularity_min".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let as_invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };
        let mut json = serde_json::to_value(&*self).map_err(as_invalid)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(as_invalid)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

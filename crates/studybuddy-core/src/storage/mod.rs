mod config;
pub mod database;
mod local_store;
pub mod migrations;
mod partition;
mod pending;

pub use config::{Config, SchedulerSettings, SyncSettings};
pub use database::Database;
pub use local_store::{DeleteOptions, LocalStore};
pub use partition::Partition;
pub use pending::{AuditEntry, ChangeOp, ChangeState, ImportOutcome, PendingChange};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `STUDYBUDDY_DATA_DIR` wins outright. Otherwise `~/.config/studybuddy`,
/// or `~/.config/studybuddy-dev` when `STUDYBUDDY_ENV=dev`.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STUDYBUDDY_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("STUDYBUDDY_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("studybuddy-dev")
            } else {
                base_dir.join("studybuddy")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

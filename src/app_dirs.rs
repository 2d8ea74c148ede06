//! Agent directory helpers anchored to a single `driftscan` home folder.
//!
//! The helpers centralize where changesets, outbox archives and log files live,
//! defaulting to the OS data directory and allowing a `DRIFTSCAN_HOME`
//! override for tests or portable setups.

use std::{
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the agent directory that lives under the OS data root.
pub const APP_DIR_NAME: &str = "driftscan";
/// Environment variable that replaces the resolved home directory.
pub const HOME_ENV_VAR: &str = "DRIFTSCAN_HOME";

static HOME_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing agent directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base data directory could be resolved.
    #[error("No suitable base data directory available for agent files")]
    NoBaseDir,
    /// Failed to create an agent directory.
    #[error("Failed to create agent directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the agent home directory, creating it if needed.
pub fn home_dir() -> Result<PathBuf, AppDirError> {
    let path = match home_override() {
        Some(path) => path,
        None => {
            let base = data_base_dir().ok_or(AppDirError::NoBaseDir)?;
            base.join(APP_DIR_NAME)
        }
    };
    ensure_dir(&path)?;
    Ok(path)
}

/// Point the home directory somewhere else for the rest of the process.
///
/// Used when the agent configuration names an explicit `data_dir`.
pub fn set_home_override(path: PathBuf) -> Result<(), AppDirError> {
    ensure_dir(&path)?;
    let mut guard = HOME_OVERRIDE.lock().expect("home override mutex poisoned");
    *guard = Some(path);
    Ok(())
}

/// Return the changeset root inside the home directory, creating it if needed.
pub fn changesets_dir() -> Result<PathBuf, AppDirError> {
    subdir("changesets")
}

/// Return the outbox directory that receives content archives.
pub fn outbox_dir() -> Result<PathBuf, AppDirError> {
    subdir("outbox")
}

/// Return the logs directory inside the home directory, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    subdir("logs")
}

fn subdir(name: &str) -> Result<PathBuf, AppDirError> {
    let path = home_dir()?.join(name);
    ensure_dir(&path)?;
    Ok(path)
}

fn ensure_dir(path: &Path) -> Result<(), AppDirError> {
    std::fs::create_dir_all(path).map_err(|source| AppDirError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn home_override() -> Option<PathBuf> {
    if let Some(path) = HOME_OVERRIDE.lock().ok().and_then(|guard| guard.clone()) {
        return Some(path);
    }
    std::env::var_os(HOME_ENV_VAR).map(PathBuf::from)
}

fn data_base_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf())
}

#[cfg(test)]
fn clear_home_override() {
    let mut guard = HOME_OVERRIDE.lock().expect("home override mutex poisoned");
    *guard = None;
}

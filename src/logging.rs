//! Global tracing setup for the agent.
//!
//! Events go to stdout and to one log file per agent launch under the home's
//! `logs/` directory. Launch files carry a sortable timestamp in their name,
//! which is also how retention decides which ones to drop.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs;

/// Launch logs kept after pruning, the current one included.
const RETAINED_LAUNCH_LOGS: usize = 10;
const LOG_FILE_PREFIX: &str = "driftscan_";
const LOG_FILE_EXTENSION: &str = ".log";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors raised while installing the agent's subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The agent log directory could not be resolved or created.
    #[error("Failed to prepare log directory: {0}")]
    LogDir(#[from] app_dirs::AppDirError),
    /// The log directory could not be listed for pruning.
    #[error("Failed to list log directory {path}: {source}")]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// An expired launch log could not be deleted.
    #[error("Failed to delete expired log {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format launch timestamp: {0}")]
    Timestamp(time::error::Format),
    /// Another subscriber is already installed.
    #[error("Failed to install global tracing subscriber: {0}")]
    Install(tracing::subscriber::SetGlobalDefaultError),
    /// This launch's log file could not be opened.
    #[error("Failed to open launch log {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Install the stdout + launch file subscriber. Calling it again is a no-op.
///
/// `RUST_LOG` overrides the default `info` level. On error nothing is
/// installed, so the caller can fall back to [`init_stderr_only`].
pub fn init() -> Result<(), LoggingError> {
    if FILE_WRITER_GUARD.get().is_some() {
        return Ok(());
    }

    let dir = app_dirs::logs_dir()?;
    let file_name = launch_file_name(launch_time())?;
    let path = dir.join(&file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::OpenFile {
            path: path.clone(),
            source,
        })?;
    prune_launch_logs(&dir, RETAINED_LAUNCH_LOGS)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, &file_name));
    let subscriber = Registry::default()
        .with(env_filter())
        .with(fmt::layer().with_timer(timer()).with_writer(std::io::stdout))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer())
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::Install)?;
    let _ = FILE_WRITER_GUARD.set(guard);

    tracing::info!(log_file = %path.display(), "Logging initialized");
    Ok(())
}

/// Install a stderr-only subscriber, used when the log directory is unusable.
pub fn init_stderr_only() {
    let subscriber = Registry::default()
        .with(env_filter())
        .with(fmt::layer().with_timer(timer()).with_writer(std::io::stderr));
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Delete the oldest launch logs so at most `keep` remain.
///
/// Only files following the launch naming scheme are considered; their
/// timestamps sort lexicographically.
fn prune_launch_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut launches: Vec<PathBuf> = listing
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter(|entry| is_launch_log(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    if launches.len() <= keep {
        return Ok(());
    }
    launches.sort();
    let expired = launches.len() - keep;
    for path in launches.into_iter().take(expired) {
        fs::remove_file(&path).map_err(|source| LoggingError::Prune { path, source })?;
    }
    Ok(())
}

fn is_launch_log(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_EXTENSION)
}

fn launch_file_name(at: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = at.format(NAME_FORMAT).map_err(LoggingError::Timestamp)?;
    Ok(format!("{LOG_FILE_PREFIX}{stamp}{LOG_FILE_EXTENSION}"))
}

fn timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const EVENT_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, EVENT_FORMAT.into())
}

fn launch_time() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

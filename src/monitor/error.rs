//! Error types for the path monitor.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid construction parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Root path set is empty")]
    EmptyPathSet,
}

/// Errors reported by an event source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Cannot watch path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Change notifications unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Event source terminated: {reason}")]
    Terminated { reason: String },
}

/// Errors from monitor lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Failed to activate event source: {0}")]
    SourceFailed(#[from] SourceError),

    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Failed to spawn event pump: {reason}")]
    WorkerSpawn { reason: String },
}

/// The execution context no longer accepts work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Execution context is closed")]
pub struct ExecutorClosed;

impl SourceError {
    /// Translate a `notify` watch error for `path`.
    pub(crate) fn from_notify(path: &std::path::Path, err: notify::Error) -> Self {
        use notify::ErrorKind;

        match &err.kind {
            ErrorKind::PathNotFound => SourceError::InvalidPath {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
            ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                SourceError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: io.to_string(),
                }
            }
            _ => SourceError::Unavailable {
                reason: format!("{}: {err}", path.display()),
            },
        }
    }
}

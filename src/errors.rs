use std::path::PathBuf;

use thiserror::Error;

/// Boxed transport error coming out of the object store SDK (or a test double).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by a backup or cleanup cycle.
///
/// Each variant names the stage that failed; the orchestrator hands the
/// first failure back to the caller as-is.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dump failed: {reason}")]
    Dump { reason: String, stderr: String },

    #[error("Compression of {} failed: {source}", .path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Job lock {} unavailable: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store error ({operation}): {source}")]
    Store {
        operation: String,
        #[source]
        source: BoxError,
    },
}

impl BackupError {
    pub fn config(msg: impl Into<String>) -> Self {
        BackupError::Configuration(msg.into())
    }

    pub fn store(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BackupError::Store {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Short stage label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            BackupError::Configuration(_) => "configuration",
            BackupError::Dump { .. } => "dump",
            BackupError::Compression { .. } => "compression",
            BackupError::Upload { .. } => "upload",
            BackupError::Store { .. } => "store",
            BackupError::Lock { .. } => "lock",
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

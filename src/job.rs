// db-backup/src/job.rs
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backup::{BackupOrchestrator, CleanupReport};
use crate::errors::{BackupError, Result};

pub const LOCK_FILE_NAME: &str = ".db-backup.lock";

/// What a scheduled job run did.
#[derive(Debug)]
pub enum JobOutcome {
    Completed { uri: String, cleanup: CleanupReport },
    /// Another run still held the lock; nothing was done.
    Skipped,
}

/// Exclusive lock on `<work_dir>/.db-backup.lock`, released on drop.
///
/// The lock is advisory and per open file, so it excludes other processes
/// (overlapping cron triggers) as well as a second handle in this process.
#[derive(Debug)]
pub struct JobLock {
    _file: File,
    path: PathBuf,
}

impl JobLock {
    /// `Ok(None)` when another holder already has the lock.
    pub fn try_acquire(work_dir: &Path) -> Result<Option<JobLock>> {
        let path = work_dir.join(LOCK_FILE_NAME);
        let lock_err = |source| BackupError::Lock {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(work_dir).map_err(lock_err)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;

        match file.try_lock() {
            Ok(()) => {
                debug!("Acquired job lock {}", path.display());
                Ok(Some(JobLock { _file: file, path }))
            }
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => Err(lock_err(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Scheduler-facing wrapper: backup followed by cleanup, one run at a time
/// per work directory.
///
/// Overlapping triggers are skipped rather than queued. A failed backup
/// skips the cleanup of that run.
#[derive(Clone)]
pub struct BackupJob {
    orchestrator: Arc<BackupOrchestrator>,
}

impl BackupJob {
    pub fn new(orchestrator: Arc<BackupOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn run_once(&self) -> Result<JobOutcome> {
        let Some(lock) = JobLock::try_acquire(self.orchestrator.work_dir())? else {
            warn!("Backup job already running; skipping this trigger");
            return Ok(JobOutcome::Skipped);
        };

        info!("Starting backup job...");
        let uri = self.orchestrator.run_backup().await?;
        let cleanup = self.orchestrator.cleanup_old_backups().await?;
        info!("Backup job completed.");
        drop(lock);
        Ok(JobOutcome::Completed { uri, cleanup })
    }
}

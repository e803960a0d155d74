// db-backup/src/backup/logic.rs
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::archive::compress_file;
use super::artifact::BackupArtifact;
use super::db_dump::produce_dump;
use crate::config::{AppConfig, BackupConfig, RetentionPolicy, StoreConfig};
use crate::errors::{BackupError, Result};
use crate::storage::{ArtifactStore, RemoteObject};

/// Pipeline stage of a backup cycle, used for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Dumping,
    Compressing,
    Uploading,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleStage::Dumping => "dumping",
            CycleStage::Compressing => "compressing",
            CycleStage::Uploading => "uploading",
        })
    }
}

/// Outcome of a retention sweep. Individual delete failures land in
/// `failures`; the sweep itself still counts as completed.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub listed: usize,
    pub stale: usize,
    pub deleted: usize,
    pub failures: Vec<(String, BackupError)>,
}

impl CleanupReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Objects whose last modification is strictly older than `cutoff`.
pub fn select_stale(objects: &[RemoteObject], cutoff: DateTime<Utc>) -> Vec<&RemoteObject> {
    objects.iter().filter(|o| o.last_modified < cutoff).collect()
}

/// Runs backup and cleanup cycles against one database and one store.
///
/// Configuration is bound at construction and re-validated at the start of
/// every cycle, so a bad config fails before any process or file is touched.
pub struct BackupOrchestrator {
    database: BackupConfig,
    store_config: StoreConfig,
    retention: RetentionPolicy,
    work_dir: PathBuf,
    store: Arc<dyn ArtifactStore>,
}

impl BackupOrchestrator {
    pub fn new(
        database: BackupConfig,
        store_config: StoreConfig,
        retention: RetentionPolicy,
        work_dir: PathBuf,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            database,
            store_config,
            retention,
            work_dir,
            store,
        }
    }

    pub fn from_config(app_config: &AppConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self::new(
            app_config.database.clone(),
            app_config.aws.clone(),
            app_config.retention,
            app_config.work_dir.clone(),
            store,
        )
    }

    /// Directory holding per-cycle dump files.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Dump, compress and upload one backup. Returns `s3://{bucket}/{key}`.
    ///
    /// Local files are removed on every exit path before this returns; the
    /// error from the failing stage is returned unchanged.
    pub async fn run_backup(&self) -> Result<String> {
        self.database.validate()?;
        let store_settings = self.store_config.validate()?;

        let mut artifact = BackupArtifact::new(&self.work_dir, &store_settings.key_prefix, Utc::now());
        info!("🚀 Starting backup cycle {} ({})", artifact.file_name, artifact.timestamp);

        let outcome = self.run_stages(&artifact).await;

        let cleanup_failures = artifact.remove_local_files().await;
        if cleanup_failures > 0 {
            warn!(
                "⚠️ {} temporary file(s) of {} could not be removed",
                cleanup_failures, artifact.file_name
            );
        }

        match outcome {
            Ok(()) => {
                let uri = format!("s3://{}/{}", self.store.bucket(), artifact.remote_key);
                info!("✅ Backup uploaded: {}", uri);
                Ok(uri)
            }
            Err(e) => {
                error!(stage = e.kind(), "❌ Backup cycle {} failed: {}", artifact.file_name, e);
                Err(e)
            }
        }
    }

    async fn run_stages(&self, artifact: &BackupArtifact) -> Result<()> {
        debug!(stage = %CycleStage::Dumping, "{}", artifact.raw_path.display());
        produce_dump(&self.database, &artifact.raw_path).await?;

        debug!(stage = %CycleStage::Compressing, "{}", artifact.compressed_path.display());
        let compressed = compress_file(&artifact.raw_path).await?;

        debug!(stage = %CycleStage::Uploading, "{}", artifact.remote_key);
        self.store.upload(&compressed, &artifact.remote_key).await
    }

    /// Deletes every object under the key prefix older than the retention window.
    pub async fn cleanup_old_backups(&self) -> Result<CleanupReport> {
        self.cleanup_old_backups_at(Utc::now()).await
    }

    pub(crate) async fn cleanup_old_backups_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let max_age = self.retention.max_age()?;
        let store_settings = self.store_config.validate()?;
        let cutoff = now - max_age;

        info!(
            "🧹 Cleaning up backups older than {} days (before {})",
            self.retention.retention_days, cutoff
        );

        // Without a complete listing nothing can be deleted safely.
        let listed = self
            .store
            .list_by_prefix(&store_settings.key_prefix)
            .await
            .inspect_err(|e| error!("❌ Cleanup failed while listing backups: {}", e))?;

        let stale = select_stale(&listed, cutoff);
        let mut report = CleanupReport {
            listed: listed.len(),
            stale: stale.len(),
            ..Default::default()
        };

        if stale.is_empty() {
            info!("🟢 No old backups to remove ({} listed).", report.listed);
            return Ok(report);
        }

        for object in stale {
            match self.store.delete(&object.key).await {
                Ok(()) => {
                    report.deleted += 1;
                    info!("🗑️ Deleted old backup: {}", object.key);
                }
                Err(e) => {
                    error!("⚠️ Failed to delete {}: {}", object.key, e);
                    report.failures.push((object.key.clone(), e));
                }
            }
        }

        if report.failed() > 0 {
            warn!(
                "Cleanup completed with {} failure(s); {} of {} stale backups deleted",
                report.failed(),
                report.deleted,
                report.stale
            );
        } else {
            info!("Cleanup completed; {} stale backups deleted", report.deleted);
        }
        Ok(report)
    }
}

// db-backup/src/backup/artifact.rs
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::archive::compressed_path_for;

/// Local files and remote key belonging to one backup cycle.
///
/// Owned by the orchestrator for the length of the cycle. Local files are
/// removed by [`BackupArtifact::remove_local_files`]; if the cycle unwinds
/// before that, `Drop` removes whatever is left.
#[derive(Debug)]
pub struct BackupArtifact {
    pub timestamp: DateTime<Utc>,
    pub file_name: String,
    pub raw_path: PathBuf,
    pub compressed_path: PathBuf,
    pub remote_key: String,
    released: bool,
}

/// ISO-8601 UTC with millisecond precision, ':' and '.' replaced by '-'.
/// `2024-05-01T03:00:00.123Z` becomes `2024-05-01T03-00-00-123Z`.
pub fn timestamp_slug(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-")
}

impl BackupArtifact {
    pub fn new(work_dir: &Path, key_prefix: &str, timestamp: DateTime<Utc>) -> Self {
        let file_name = format!("backup-{}.dump", timestamp_slug(&timestamp));
        let raw_path = work_dir.join(&file_name);
        let compressed_path = compressed_path_for(&raw_path);
        let remote_key = format!("{}{}.gz", key_prefix, file_name);

        Self {
            timestamp,
            file_name,
            raw_path,
            compressed_path,
            remote_key,
            released: false,
        }
    }

    /// Deletes the raw and compressed files. Failures are logged as warnings
    /// and never returned; a file that was never created is not a failure.
    /// Returns how many deletions failed.
    pub async fn remove_local_files(&mut self) -> usize {
        let mut failures = 0;
        for path in [&self.raw_path, &self.compressed_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("🧹 Temporary file removed: {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    failures += 1;
                    warn!("⚠️ Failed to delete temporary file {}: {}", path.display(), e);
                }
            }
        }
        self.released = true;
        failures
    }
}

impl Drop for BackupArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in [&self.raw_path, &self.compressed_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("⚠️ Failed to delete temporary file {}: {}", path.display(), e);
                }
            }
        }
    }
}

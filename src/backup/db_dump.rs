// db-backup/src/backup/db_dump.rs
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};
use which::which;

use crate::config::{BackupConfig, ConnectionParams};
use crate::errors::{BackupError, Result};

// Helper function to find pg_dump executable
fn find_pg_dump_executable(config: &BackupConfig) -> Result<PathBuf> {
    if let Some(path) = &config.pg_dump_path {
        return Ok(path.clone());
    }
    which("pg_dump").map_err(|e| BackupError::Dump {
        reason: format!(
            "pg_dump executable not found in PATH ({e}). Please ensure PostgreSQL client tools are installed and in your PATH."
        ),
        stderr: String::new(),
    })
}

/// Custom-format dump including large objects, verbose so stderr carries progress.
/// The password travels in `PGPASSWORD` and never appears in argv.
fn build_pg_dump_command(executable: &Path, params: &ConnectionParams<'_>, output_path: &Path) -> Command {
    let mut command = Command::new(executable);
    command
        .arg("-h")
        .arg(params.host)
        .arg("-p")
        .arg(params.port.to_string())
        .arg("-U")
        .arg(params.user)
        .arg("-F")
        .arg("c")
        .arg("-b")
        .arg("-v")
        .arg("-f")
        .arg(output_path)
        .arg(params.database_name)
        .env("PGPASSWORD", params.password)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    command
}

/// Dumps the configured database to `output_path` with pg_dump.
///
/// The connection fields are checked before anything is spawned. On failure
/// the output file may exist partially; removing it is the caller's job.
pub async fn produce_dump(config: &BackupConfig, output_path: &Path) -> Result<PathBuf> {
    let params = config.validate()?;
    let pg_dump_path = find_pg_dump_executable(config)?;
    debug!("Using pg_dump executable at: {}", pg_dump_path.display());

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BackupError::Dump {
                reason: format!("Failed to create dump directory {}: {}", parent.display(), e),
                stderr: String::new(),
            })?;
    }

    info!(
        "🧩 Starting pg_dump for database \"{}\" on {}:{}...",
        params.database_name, params.host, params.port
    );

    let output = build_pg_dump_command(&pg_dump_path, &params, output_path)
        .output()
        .await
        .map_err(|e| BackupError::Dump {
            reason: format!("Failed to execute {}: {}", pg_dump_path.display(), e),
            stderr: String::new(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "pg_dump", "{}", line.trim());
    }
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "pg_dump", "[stderr] {}", line.trim());
    }

    if !output.status.success() {
        error!("❌ pg_dump failed with {}", output.status);
        let last_line = stderr.lines().rev().map(str::trim).find(|l| !l.is_empty());
        let reason = match last_line {
            Some(line) => format!("pg_dump exited with {}: {}", output.status, line),
            None => format!("pg_dump exited with {}", output.status),
        };
        return Err(BackupError::Dump {
            reason,
            stderr: stderr.trim().to_string(),
        });
    }

    info!("✅ pg_dump completed successfully: {}", output_path.display());
    Ok(output_path.to_path_buf())
}

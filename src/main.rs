//! PostgreSQL backup tool
//!
//! Dumps a database with pg_dump, gzips it, uploads it to S3 and prunes
//! uploads older than the retention window. Scheduling is left to the caller
//! (cron, a systemd timer, a Kubernetes CronJob).

// db-backup/src/main.rs
mod backup;
mod config;
mod errors;
mod job;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backup::BackupOrchestrator;
use config::AppConfig;
use job::{BackupJob, JobOutcome};
use storage::s3::S3ArtifactStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dump PostgreSQL to S3 and prune old backups")]
struct Cli {
    /// Path to config.json
    #[arg(long, env = "DB_BACKUP_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run one backup cycle: dump, compress, upload (runs even when `enabled` is false)
    Backup,
    /// Run one retention sweep (runs even when `enabled` is false)
    Cleanup,
    /// Backup followed by cleanup, as a scheduled trigger would run it; no-op when `enabled` is false
    Job,
}

impl Command {
    /// Only the scheduled trigger honours `enabled`; manual runs are explicit.
    fn skipped_when_disabled(self, enabled: bool) -> bool {
        matches!(self, Command::Job) && !enabled
    }
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<ExitCode> {
    let app_config = AppConfig::load_from_json(&cli.config)
        .context(format!("Failed to load application configuration from {}", cli.config.display()))?;

    if cli.command.skipped_when_disabled(app_config.enabled) {
        info!("Backups disabled by config; nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let store_settings = app_config
        .aws
        .validate()
        .context("Invalid `aws` configuration")?;
    let store = S3ArtifactStore::connect(&store_settings).await;
    let orchestrator = Arc::new(BackupOrchestrator::from_config(&app_config, Arc::new(store)));

    match cli.command {
        Command::Backup => {
            let uri = orchestrator.run_backup().await.context("Backup process failed")?;
            info!("✅ Operation completed successfully: {}", uri);
            Ok(ExitCode::SUCCESS)
        }
        Command::Cleanup => {
            let report = orchestrator
                .cleanup_old_backups()
                .await
                .context("Cleanup process failed")?;
            Ok(cleanup_exit_code(&report))
        }
        Command::Job => {
            info!(
                "Schedule (handled externally): {}, Retention: {} days",
                app_config.cron, app_config.retention.retention_days
            );
            match BackupJob::new(orchestrator).run_once().await.context("Backup job failed")? {
                JobOutcome::Completed { uri, cleanup } => {
                    info!("✅ Backup job uploaded {}", uri);
                    Ok(cleanup_exit_code(&cleanup))
                }
                JobOutcome::Skipped => Ok(ExitCode::SUCCESS),
            }
        }
    }
}

/// Partial sweeps still finish, but a non-zero exit lets the scheduler notice.
fn cleanup_exit_code(report: &backup::CleanupReport) -> ExitCode {
    if report.failed() > 0 {
        warn!("Cleanup finished with {} failed deletion(s)", report.failed());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

mod logic; // Orchestration of dump -> compress -> upload and the retention sweep
pub(crate) mod archive; // gzip compression of the raw dump
pub(crate) mod artifact; // Per-cycle local files and remote key
pub(crate) mod db_dump; // pg_dump subprocess
#[cfg(all(test, unix))]
pub(crate) mod testutil;

pub use logic::{BackupOrchestrator, CleanupReport};

// db-backup/src/backup/archive.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{BackupError, Result};

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// `backup.dump` -> `backup.dump.gz`, in the same directory.
pub fn compressed_path_for(raw_path: &Path) -> PathBuf {
    let mut name = OsString::from(raw_path.as_os_str());
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzips `raw_path` into a sibling `.gz` file and returns its path.
///
/// The copy runs on a blocking worker with a fixed-size buffer, so memory use
/// does not depend on dump size. Returns only once the encoder has written its
/// trailer and the output file has been synced. The raw file is left in place.
pub async fn compress_file(raw_path: &Path) -> Result<PathBuf> {
    let source = raw_path.to_path_buf();
    let destination = compressed_path_for(raw_path);

    info!(
        "🗜 Compressing {} to {}",
        source.display(),
        destination.display()
    );

    let task_source = source.clone();
    let task_destination = destination.clone();
    let (bytes_in, bytes_out) =
        tokio::task::spawn_blocking(move || gzip_stream(&task_source, &task_destination))
            .await
            .map_err(|join_err| BackupError::Compression {
                path: source.clone(),
                source: io::Error::other(join_err),
            })?
            .map_err(|e| BackupError::Compression {
                path: source.clone(),
                source: e,
            })?;

    info!(
        "✅ Compressed {} bytes to {} bytes ({})",
        bytes_in,
        bytes_out,
        destination.display()
    );
    Ok(destination)
}

fn gzip_stream(source: &Path, destination: &Path) -> io::Result<(u64, u64)> {
    // Open the input first so a missing dump never leaves an empty .gz behind.
    let input = File::open(source)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, input);

    let output = File::create(destination)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    let bytes_in = io::copy(&mut reader, &mut encoder)?;

    let output = encoder.finish()?;
    output.sync_all()?;
    let bytes_out = output.metadata()?.len();
    Ok((bytes_in, bytes_out))
}

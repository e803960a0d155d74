//! Fake `pg_dump` executables for subprocess tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::{BackupConfig, StoreConfig};

/// Writes an executable shell script standing in for pg_dump.
///
/// The preamble records the invocation next to the script (`invoked` marker)
/// and puts the `-f` argument in `$out`; `body` decides what happens next.
pub fn fake_pg_dump(dir: &Path, body: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
touch "$(dirname "$0")/invoked"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
{body}
"#
    );
    let path = dir.join("pg_dump");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn was_invoked(fake: &Path) -> bool {
    fake.parent().unwrap().join("invoked").exists()
}

/// Writes `size` zero bytes, after checking the password arrived via env.
pub fn writes_dump(size: usize) -> String {
    format!(
        r#"[ "$PGPASSWORD" = "s3cret" ] || {{ echo "password not in environment" >&2; exit 2; }}
echo "pg_dump: dumping contents of table public.users"
head -c {size} /dev/zero > "$out""#
    )
}

pub const FAILS_WITH_CONNECTION_REFUSED: &str = r#"echo "connection refused" >&2
exit 1"#;

/// Writes a dump, then blocks the compressor by occupying its output path.
pub const WRITES_DUMP_AND_BLOCKS_GZ: &str = r#"echo "data" > "$out"
mkdir "$out.gz""#;

pub fn database_config(pg_dump: &Path) -> BackupConfig {
    BackupConfig {
        host: Some("localhost".into()),
        port: Some(5432),
        database_name: Some("app".into()),
        user: Some("backup".into()),
        password: Some("s3cret".into()),
        pg_dump_path: Some(pg_dump.to_path_buf()),
    }
}

pub fn store_config() -> StoreConfig {
    StoreConfig {
        bucket: Some("mybucket".into()),
        region: Some("us-east-1".into()),
        access_key_id: Some("AKIAEXAMPLE".into()),
        secret_access_key: Some("secret".into()),
        key_prefix: None,
        endpoint_url: None,
    }
}

pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::errors::Result;

/// An object as reported by a store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Remote side of a backup: upload finished artifacts, list and prune old ones.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Bucket name, used to build the `s3://bucket/key` URI.
    fn bucket(&self) -> &str;

    /// Streams `local_path` to `remote_key`. Fails with `BackupError::Upload`.
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()>;

    /// Every object under `prefix`, with pagination already drained.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

//! In-memory `ArtifactStore` used by orchestrator and job tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use super::{ArtifactStore, RemoteObject};
use crate::errors::{BackupError, Result};

#[derive(Default)]
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<Vec<RemoteObject>>,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    deletes: Mutex<Vec<String>>,
    list_calls: Mutex<usize>,
    fail_upload: bool,
    fail_list: bool,
    fail_delete: HashSet<String>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    pub fn with_objects(bucket: &str, objects: Vec<RemoteObject>) -> Self {
        let store = Self::new(bucket);
        *store.objects.lock().unwrap() = objects;
        store
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_delete(mut self, key: &str) -> Self {
        self.fail_delete.insert(key.to_string());
        self
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().iter().map(|o| o.key.clone()).collect()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        if self.fail_upload {
            return Err(BackupError::Upload {
                key: remote_key.to_string(),
                source: "access denied".into(),
            });
        }
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| BackupError::Upload {
                key: remote_key.to_string(),
                source: Box::new(e),
            })?;
        self.uploads.lock().unwrap().push((remote_key.to_string(), body));
        self.objects.lock().unwrap().push(RemoteObject {
            key: remote_key.to_string(),
            last_modified: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        *self.list_calls.lock().unwrap() += 1;
        if self.fail_list {
            return Err(BackupError::store("list", "connection reset by peer"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_delete.contains(key) {
            return Err(BackupError::store(format!("delete {key}"), "forbidden"));
        }
        self.objects.lock().unwrap().retain(|o| o.key != key);
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

// db-backup/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::operation::list_objects_v2::ListObjectsV2Output;
use s3::operation::put_object::builders::PutObjectFluentBuilder;
use s3::primitives::ByteStream;
use std::future::Future;
use std::path::Path;
use tracing::{debug, info};

use super::{ArtifactStore, RemoteObject};
use crate::config::StoreSettings;
use crate::errors::{BackupError, Result};

pub const CONTENT_TYPE: &str = "application/gzip";
pub const CONTENT_ENCODING: &str = "gzip";

/// `ArtifactStore` backed by S3 or any S3-compatible service
/// (DigitalOcean Spaces, MinIO) when an endpoint URL is configured.
pub struct S3ArtifactStore {
    client: s3::Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub async fn connect(settings: &StoreSettings) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &settings.access_key_id,
                &settings.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        // Custom endpoints rarely support virtual-hosted buckets.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint_url.is_some())
            .build();

        debug!(bucket = %settings.bucket, region = %settings.region, "S3 client configured");
        Self {
            client: s3::Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        }
    }
}

fn to_utc(ts: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

/// One page of a listing plus the token for the next one, if any.
#[derive(Debug, Default)]
pub(crate) struct ListPage {
    pub objects: Vec<RemoteObject>,
    pub next_token: Option<String>,
}

impl ListPage {
    /// A page continues while a continuation token is present, unless the
    /// response says outright it is not truncated. Some S3-compatible
    /// providers omit `IsTruncated` entirely.
    fn from_output(output: &ListObjectsV2Output) -> Self {
        let mut objects = Vec::with_capacity(output.contents().len());
        for object in output.contents() {
            let Some(key) = object.key() else { continue };
            let Some(last_modified) = object.last_modified().and_then(to_utc) else {
                debug!(key, "Skipping listed object without a usable LastModified");
                continue;
            };
            objects.push(RemoteObject {
                key: key.to_string(),
                last_modified,
            });
        }

        let next_token = match (output.next_continuation_token(), output.is_truncated()) {
            (Some(token), None | Some(true)) if !token.is_empty() => Some(token.to_string()),
            _ => None,
        };
        Self { objects, next_token }
    }
}

/// Calls `fetch_page` with each continuation token until the listing is
/// exhausted and returns every object as one sequence.
pub(crate) async fn drain_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<RemoteObject>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListPage>>,
{
    let mut objects = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(token.take()).await?;
        pages += 1;
        objects.extend(page.objects);
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(pages, count = objects.len(), "Listing drained");
    Ok(objects)
}

impl S3ArtifactStore {
    fn put_request(&self, remote_key: &str, body: ByteStream) -> PutObjectFluentBuilder {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(remote_key)
            .content_type(CONTENT_TYPE)
            .content_encoding(CONTENT_ENCODING)
            .body(body)
    }

    async fn fetch_page(&self, prefix: &str, token: Option<String>) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| BackupError::store(format!("list s3://{}/{}", self.bucket, prefix), e))?;
        Ok(ListPage::from_output(&output))
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        info!(
            "📤 Uploading {} to s3://{}/{}",
            local_path.display(),
            self.bucket,
            remote_key
        );

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| BackupError::Upload {
                key: remote_key.to_string(),
                source: Box::new(e),
            })?;

        self.put_request(remote_key, body)
            .send()
            .await
            .map_err(|e| BackupError::Upload {
                key: remote_key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        drain_pages(move |token| self.fetch_page(prefix, token)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BackupError::store(format!("delete s3://{}/{}", self.bucket, key), e))?;
        Ok(())
    }
}

//! S3 uploader backend.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::{collect_files, find_master_file, Uploader};

/// Publishes outputs to an S3 bucket using the default AWS credential
/// chain.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Uploader {
    pub async fn new(bucket: String, region: String) -> StorageResult<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&config),
            bucket,
            region,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key)
    }

    async fn put_file(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<String> {
        debug!(
            bucket = %self.bucket,
            key = remote_path,
            "Uploading {} to S3",
            local_path.display()
        );

        self.put_file(local_path, remote_path).await?;

        let url = self.object_url(remote_path);
        info!(url = %url, "Upload completed");
        Ok(url)
    }

    async fn upload_directory(
        &self,
        local_dir: &Path,
        remote_prefix: &str,
    ) -> StorageResult<String> {
        let files = collect_files(local_dir)?;

        let mut uploaded = Vec::with_capacity(files.len());
        for rel in &files {
            let key = join_key(remote_prefix, rel);
            self.put_file(&local_dir.join(rel), &key).await?;
            uploaded.push(rel.to_string_lossy().replace('\\', "/"));
        }

        let master = find_master_file(&uploaded)?;
        let url = self.object_url(&join_key(remote_prefix, Path::new(master)));

        info!(url = %url, files = uploaded.len(), "Directory upload completed");
        Ok(url)
    }
}

/// S3 keys always use forward slashes.
fn join_key(prefix: &str, rel: &Path) -> String {
    let rel = rel.to_string_lossy().replace('\\', "/");
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        rel
    } else {
        format!("{}/{}", prefix, rel)
    }
}

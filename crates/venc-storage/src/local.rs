//! Local-filesystem uploader backend, for development and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::{collect_files, find_master_file, Uploader};

/// Copies outputs into a base directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    base_dir: PathBuf,
}

impl LocalUploader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    async fn copy_into(&self, local_path: &Path, remote_path: &str) -> StorageResult<PathBuf> {
        let dest = self.base_dir.join(remote_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", dest.display(), e)))?;
        Ok(dest)
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<String> {
        debug!(
            "Copying {} to {}",
            local_path.display(),
            self.base_dir.join(remote_path).display()
        );
        let dest = self.copy_into(local_path, remote_path).await?;
        Ok(format!("file://{}", dest.display()))
    }

    async fn upload_directory(
        &self,
        local_dir: &Path,
        remote_prefix: &str,
    ) -> StorageResult<String> {
        let files = collect_files(local_dir)?;

        let mut uploaded = Vec::with_capacity(files.len());
        for rel in &files {
            let remote = Path::new(remote_prefix).join(rel);
            self.copy_into(&local_dir.join(rel), &remote.to_string_lossy())
                .await?;
            uploaded.push(rel.to_string_lossy().to_string());
        }

        let master = find_master_file(&uploaded)?;
        let dest = self.base_dir.join(remote_prefix).join(master);
        Ok(format!("file://{}", dest.display()))
    }
}

//! Object storage backends for the venc encoding service.
//!
//! This crate provides:
//! - The `Uploader` capability set (single file + directory publish)
//! - An S3 backend
//! - A local-filesystem backend for development and tests

pub mod error;
pub mod local;
pub mod s3;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use error::{StorageError, StorageResult};
pub use local::LocalUploader;
pub use s3::S3Uploader;

/// Publishes encoded outputs to a storage backend.
///
/// Both operations are idempotent with respect to the final state
/// (overwrite semantics). Directory upload is not transactional: partial
/// failure leaves a partial tree and surfaces as a hard error.
#[async_trait]
pub trait Uploader: Send + Sync + std::fmt::Debug {
    /// Upload a single file, returning an accessible URL.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<String>;

    /// Upload a directory tree, preserving relative paths under
    /// `remote_prefix`. Returns the URL of the master playlist/manifest.
    async fn upload_directory(&self, local_dir: &Path, remote_prefix: &str)
        -> StorageResult<String>;
}

/// Build the uploader selected by configuration. All backend-specific
/// settings come from the environment.
pub async fn from_env(backend: &str) -> StorageResult<Arc<dyn Uploader>> {
    match backend {
        "s3" => {
            let bucket = std::env::var("S3_BUCKET")
                .map_err(|_| StorageError::config("S3_BUCKET is required for the s3 backend"))?;
            let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
            Ok(Arc::new(S3Uploader::new(bucket, region).await?))
        }
        "local" => {
            let base_dir = std::env::var("LOCAL_STORAGE_DIR")
                .map_err(|_| StorageError::config("LOCAL_STORAGE_DIR is required for the local backend"))?;
            Ok(Arc::new(LocalUploader::new(base_dir)))
        }
        other => Err(StorageError::UnsupportedBackend(other.to_string())),
    }
}

/// Pick the master file out of an uploaded tree, by preference:
/// `master.m3u8` > `playlist.m3u8` > `manifest.mpd`.
pub(crate) fn find_master_file(files: &[String]) -> StorageResult<&str> {
    let mut fallback: Option<&str> = None;
    for file in files {
        if file.ends_with("master.m3u8") {
            return Ok(file);
        }
        if fallback.is_none()
            && (file.ends_with("playlist.m3u8") || file.ends_with("manifest.mpd"))
        {
            fallback = Some(file);
        }
    }
    fallback.ok_or(StorageError::MasterNotFound)
}

/// Collect every file under `dir`, as paths relative to it.
pub(crate) fn collect_files(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    fn walk(
        root: &Path,
        dir: &Path,
        out: &mut Vec<std::path::PathBuf>,
    ) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Port the worker RPC server listens on
    pub rpc_port: u16,
    /// Maximum concurrent jobs
    pub max_concurrent: u32,
    /// Root directory for per-job workspaces
    pub work_dir: PathBuf,
    /// Storage backend name ("s3" or "local")
    pub storage_backend: String,
    /// Stable worker identity reported in status responses
    pub worker_id: String,
    /// Development-mode flag that disables idle shutdown
    pub disable_idle_shutdown: bool,
    /// Grace window between going idle and shutting down
    pub idle_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            rpc_port: 50051,
            max_concurrent: 2,
            work_dir: PathBuf::from("/tmp/venc-jobs"),
            storage_backend: "s3".to_string(),
            worker_id: "worker-1".to_string(),
            disable_idle_shutdown: false,
            idle_grace: Duration::from_millis(1000),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_port: std::env::var("RPC_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rpc_port),
            max_concurrent: std::env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            storage_backend: std::env::var("STORAGE_BACKEND").unwrap_or(defaults.storage_backend),
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            disable_idle_shutdown: std::env::var("DISABLE_IDLE_SHUTDOWN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            idle_grace: Duration::from_millis(
                std::env::var("IDLE_SHUTDOWN_GRACE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

//! Worker status and cancellation messages.

use serde::{Deserialize, Serialize};

/// Snapshot of a worker's current load, returned on demand and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Number of jobs currently running
    pub current_jobs: u32,
    /// Admission limit for this worker
    pub max_concurrent_jobs: u32,
    /// Ids of the running jobs
    pub active_job_ids: Vec<String>,
    /// Stable worker identity
    pub worker_id: String,
    /// Worker build version
    pub version: String,
}

impl WorkerStatus {
    /// True when the worker can admit another job.
    pub fn has_capacity(&self) -> bool {
        self.current_jobs < self.max_concurrent_jobs
    }
}

/// Request to cancel a running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub job_id: String,
}

/// Outcome of a cancellation request. Unknown jobs are a soft failure,
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

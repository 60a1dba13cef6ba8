//! Job submission types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A fully-specified encoding job, as sent from the dispatcher to a worker.
///
/// Immutable after creation. The `job_id` is assigned by the dispatcher and
/// is opaque to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Unique job identifier
    pub job_id: String,
    /// Source video URL
    pub input_url: String,
    /// Encoding preset name (resolved on the worker)
    pub preset: String,
    /// Upload destination
    pub output: OutputConfig,
}

/// Where the encoded output should be published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Storage backend name ("s3" or "local")
    pub storage: String,
    /// Remote path or key prefix for the output
    pub path: String,
    /// Opaque metadata forwarded to the storage backend
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

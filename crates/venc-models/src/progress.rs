//! Progress events streamed from workers to clients.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an encoding job.
///
/// Progression is monotonic along `Queued → Processing → Uploading →
/// Completed`, or jumps to `Failed` from any non-terminal state. `Completed`
/// and `Failed` are terminal: no further events are emitted after either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job accepted by a worker, waiting for the pipeline to start
    #[default]
    Queued,
    /// Encoder is running
    Processing,
    /// Encoded output is being published to storage
    Uploading,
    /// Job finished, output available
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states produce no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single element of a job's progress stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job this event belongs to
    pub job_id: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Percent complete, 0.0 to 100.0
    pub progress: f32,
    /// Human-readable description of the current step
    pub message: String,
    /// URL of the published output, set only on `Completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Error description, set only on `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 emission time
    pub timestamp: String,
}

impl ProgressEvent {
    fn new(job_id: impl Into<String>, status: JobStatus, progress: f32, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress: progress.clamp(0.0, 100.0),
            message: message.into(),
            output_url: None,
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Job accepted and queued on a worker.
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Queued, 0.0, "Job queued")
    }

    /// Encoding in progress.
    pub fn processing(job_id: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Processing, progress, message)
    }

    /// Upload started.
    pub fn uploading(job_id: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Uploading, 100.0, "Uploading output")
    }

    /// Job finished; `output_url` points at the published file or manifest.
    pub fn completed(job_id: impl Into<String>, output_url: impl Into<String>) -> Self {
        let mut event = Self::new(job_id, JobStatus::Completed, 100.0, "Job completed");
        event.output_url = Some(output_url.into());
        event
    }

    /// Job failed; `error` carries the cause.
    pub fn failed(job_id: impl Into<String>, message: impl Into<String>, error: impl Into<String>) -> Self {
        let mut event = Self::new(job_id, JobStatus::Failed, 0.0, message);
        event.error = Some(error.into());
        event
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"queued\"");
        assert_eq!(serde_json::to_string(&JobStatus::Uploading).unwrap(), "\"uploading\"");
        let status: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, JobStatus::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Uploading.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_optional_fields_omitted() {
        let event = ProgressEvent::processing("j1", 42.0, "Encoding: 42.0%");
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("output_url"));
        assert!(!json.contains("\"error\""));

        let done = ProgressEvent::completed("j1", "https://bucket/out.mp4");
        let json = serde_json::to_string(&done).unwrap();
        assert!(json.contains("output_url"));
    }

    #[test]
    fn test_progress_clamped() {
        let event = ProgressEvent::processing("j1", 140.0, "m");
        assert_eq!(event.progress, 100.0);
        let event = ProgressEvent::processing("j1", -3.0, "m");
        assert_eq!(event.progress, 0.0);
    }
}

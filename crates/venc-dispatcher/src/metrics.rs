//! Prometheus metrics for the dispatcher.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use venc_models::JobStatus;

/// Install the Prometheus recorder. Returns a handle used to render
/// metrics at `/metrics`.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "venc_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "venc_jobs_rejected_total";
    pub const JOBS_TOTAL: &str = "venc_jobs_total";
    pub const PROGRESS_STREAMS_TOTAL: &str = "venc_progress_streams_total";
}

/// Record an accepted submission.
pub fn record_job_submitted(preset: &str) {
    let labels = [("preset", preset.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a submission rejected before reaching a worker.
pub fn record_job_rejected(reason: &'static str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_terminal(status: JobStatus) {
    let labels = [("status", status.as_str().to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

/// Record a progress stream being opened.
pub fn record_stream_opened() {
    counter!(names::PROGRESS_STREAMS_TOTAL).increment(1);
}

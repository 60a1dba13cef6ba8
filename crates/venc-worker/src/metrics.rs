//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Returns the render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const ACTIVE_JOBS: &str = "venc_worker_active_jobs";
    pub const JOBS_TOTAL: &str = "venc_worker_jobs_total";
    pub const ENCODE_DURATION_SECONDS: &str = "venc_worker_encode_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "venc_worker_upload_duration_seconds";
}

/// Update the active jobs gauge.
pub fn set_active_jobs(count: usize) {
    gauge!(names::ACTIVE_JOBS).set(count as f64);
}

/// Record a finished job.
pub fn record_job(status: &'static str) {
    let labels = [("status", status.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

/// Record encode wall time.
pub fn record_encode_duration(preset: &str, duration_secs: f64) {
    let labels = [("preset", preset.to_string())];
    histogram!(names::ENCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record upload wall time.
pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

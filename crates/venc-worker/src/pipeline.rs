//! Per-job encoding pipeline: preset → workspace → probe → encode →
//! validate → upload.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use venc_media::validator::{ValidationOptions, Validator};
use venc_media::{preset, probe, EncodeUpdate, Encoder, MediaError};
use venc_models::{JobRequest, ProgressEvent};
use venc_storage::Uploader;

use crate::config::WorkerConfig;
use crate::metrics;
use crate::retry::{retry_with_backoff, RetryConfig, RetryError};

/// Buffer between the encoder's update stream and the progress channel.
const UPDATE_BUFFER: usize = 16;

/// Everything a pipeline run needs, shared across jobs.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub encoder: Encoder,
    pub validator: Validator,
    pub uploader: Arc<dyn Uploader>,
}

impl WorkerContext {
    pub fn new(config: WorkerConfig, uploader: Arc<dyn Uploader>) -> Self {
        let encoder = Encoder::new(config.work_dir.clone());
        Self {
            config,
            encoder,
            validator: Validator::new(),
            uploader,
        }
    }
}

/// A pipeline failure that becomes the job's terminal FAILED event.
struct JobFailure {
    message: &'static str,
    error: String,
}

impl JobFailure {
    fn new(message: &'static str, error: impl Into<String>) -> Self {
        Self {
            message,
            error: error.into(),
        }
    }
}

/// Run one job to its terminal event.
///
/// Exactly one terminal event is sent on `events` unless the receiver is
/// gone (client disconnected), in which case the job is simply abandoned
/// after cleanup.
pub async fn run(
    ctx: &WorkerContext,
    req: &JobRequest,
    events: mpsc::Sender<ProgressEvent>,
    cancel: watch::Receiver<bool>,
) {
    if events.send(ProgressEvent::queued(&req.job_id)).await.is_err() {
        return;
    }

    match execute(ctx, req, &events, cancel).await {
        Ok(output_url) => {
            info!(job_id = %req.job_id, output_url = %output_url, "Job completed");
            metrics::record_job("completed");
            let _ = events
                .send(ProgressEvent::completed(&req.job_id, output_url))
                .await;
        }
        Err(failure) => {
            warn!(job_id = %req.job_id, error = %failure.error, "{}", failure.message);
            metrics::record_job("failed");
            let _ = events
                .send(ProgressEvent::failed(&req.job_id, failure.message, failure.error))
                .await;
        }
    }
}

async fn execute(
    ctx: &WorkerContext,
    req: &JobRequest,
    events: &mpsc::Sender<ProgressEvent>,
    mut cancel: watch::Receiver<bool>,
) -> Result<String, JobFailure> {
    // 1. Preset resolution.
    let preset = preset::get(&req.preset)
        .map_err(|e| JobFailure::new("Preset resolution failed", e.to_string()))?;

    // 3. Duration probe, used only to scale progress percentages.
    let duration_secs = tokio::select! {
        changed = cancel.changed() => {
            let _ = changed;
            return Err(cancelled());
        }
        probed = probe::input_duration(&req.input_url) => match probed {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!(job_id = %req.job_id, error = %e, "Failed to probe input duration");
                None
            }
        },
    };

    if events
        .send(ProgressEvent::processing(&req.job_id, 0.0, "Starting encoding"))
        .await
        .is_err()
    {
        return Err(cancelled());
    }

    // 4. Encode, with throttled progress updates forwarded to the stream.
    // Dropping the forwarder's receiver aborts the encode, so a dead
    // progress stream cancels the job rather than encoding into the void.
    let (update_tx, update_rx) = mpsc::channel::<EncodeUpdate>(UPDATE_BUFFER);
    let forwarder = tokio::spawn(forward_updates(
        req.job_id.clone(),
        update_rx,
        events.clone(),
    ));

    let encode_started = Instant::now();
    let encode_result = ctx
        .encoder
        .encode(
            &req.job_id,
            &req.input_url,
            preset,
            duration_secs,
            cancel.clone(),
            update_tx,
        )
        .await;
    let _ = forwarder.await;

    let output_path = match encode_result {
        Ok(path) => {
            metrics::record_encode_duration(preset.name, encode_started.elapsed().as_secs_f64());
            path
        }
        Err(MediaError::Cancelled) => return Err(cancelled()),
        Err(e) => return Err(JobFailure::new("Encoding failed", e.to_string())),
    };

    // 5. Validation: broken artifacts never reach storage.
    let options = ValidationOptions {
        expected: Some(preset.expected.clone()),
        ..Default::default()
    };
    let report = ctx
        .validator
        .validate(&output_path, &options)
        .await
        .map_err(|e| JobFailure::new("Validation error", e.to_string()))?;

    if !report.valid() {
        return Err(JobFailure::new(
            "Output validation failed",
            format!("validation failed: {}", report.error_messages().join("; ")),
        ));
    }
    if !report.warnings.is_empty() {
        warn!(
            job_id = %req.job_id,
            warnings = ?report.warning_messages(),
            "Output validation warnings"
        );
    }

    // 6. Upload.
    if events
        .send(ProgressEvent::uploading(&req.job_id))
        .await
        .is_err()
    {
        return Err(cancelled());
    }

    let is_dir = tokio::fs::metadata(&output_path)
        .await
        .map(|m| m.is_dir())
        .map_err(|e| JobFailure::new("Upload failed", e.to_string()))?;

    let upload_started = Instant::now();
    let retry_config = RetryConfig::default();
    let upload_result = retry_with_backoff(&retry_config, &mut cancel, || async {
        if is_dir {
            ctx.uploader
                .upload_directory(&output_path, &req.output.path)
                .await
        } else {
            ctx.uploader.upload(&output_path, &req.output.path).await
        }
    })
    .await;

    match upload_result {
        Ok(url) => {
            metrics::record_upload_duration(upload_started.elapsed().as_secs_f64());
            Ok(url)
        }
        Err(RetryError::Cancelled) => Err(cancelled()),
        Err(RetryError::Exhausted { error, attempts }) => Err(JobFailure::new(
            "Upload failed",
            format!("upload failed after {} attempts: {}", attempts, error),
        )),
    }
}

fn cancelled() -> JobFailure {
    JobFailure::new("Job cancelled", "job cancelled")
}

/// Forward encoder updates to the progress stream. Stops (dropping its
/// receiver, which aborts the encode) when the stream is gone.
async fn forward_updates(
    job_id: String,
    mut updates: mpsc::Receiver<EncodeUpdate>,
    events: mpsc::Sender<ProgressEvent>,
) {
    while let Some(update) = updates.recv().await {
        let event = ProgressEvent::processing(&job_id, update.percent, update.message);
        if events.send(event).await.is_err() {
            warn!(job_id = %job_id, "Progress stream closed, abandoning job");
            break;
        }
    }
}

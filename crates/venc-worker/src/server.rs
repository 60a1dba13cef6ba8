//! Worker RPC surface: job submission with streamed progress, status
//! queries, and cancellation.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use venc_models::{JobRequest, ProgressEvent};

use crate::admission::JobAdmission;
use crate::error::WorkerError;
use crate::pipeline::{self, WorkerContext};

/// Capacity of the per-job progress channel feeding the response body.
/// A slow or stalled reader back-pressures the pipeline through it.
const EVENT_BUFFER: usize = 32;

/// Shared state for the worker RPC server.
#[derive(Clone)]
pub struct WorkerState {
    pub ctx: Arc<WorkerContext>,
    pub admission: Arc<JobAdmission>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Build the worker router.
pub fn create_router(state: WorkerState) -> Router {
    let metrics_routes = if let Some(handle) = state.metrics_handle.clone() {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/v1/jobs", post(submit_job))
        .route("/v1/status", get(get_status))
        .route("/v1/jobs/:job_id/cancel", post(cancel_job))
        .route("/health", get(health))
        .merge(metrics_routes)
        .with_state(state)
}

/// Admit the job and stream its progress events back as NDJSON. The
/// stream ends after the terminal event; the connection dropping cancels
/// the job.
async fn submit_job(State(state): State<WorkerState>, Json(req): Json<JobRequest>) -> Response {
    info!(
        job_id = %req.job_id,
        input_url = %req.input_url,
        preset = %req.preset,
        "Received job"
    );

    let cancel_rx = match state.admission.admit(&req.job_id) {
        Ok(rx) => rx,
        Err(e @ WorkerError::CapacityExhausted { .. }) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": e.to_string(), "code": "CAPACITY_EXHAUSTED" })),
            )
                .into_response();
        }
        Err(e) => {
            error!(job_id = %req.job_id, error = %e, "Admission failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let (events_tx, events_rx) = mpsc::channel::<ProgressEvent>(EVENT_BUFFER);

    let ctx = Arc::clone(&state.ctx);
    let admission = Arc::clone(&state.admission);
    tokio::spawn(async move {
        pipeline::run(&ctx, &req, events_tx, cancel_rx).await;

        // Retirement: workspace removal strictly before the counter drops,
        // so a racing status probe never sees an idle worker with stale
        // job files.
        if let Err(e) = ctx.encoder.cleanup(&req.job_id).await {
            error!(job_id = %req.job_id, error = %e, "Failed to clean up job workspace");
        }
        admission.retire(&req.job_id);
    });

    let body = Body::from_stream(ReceiverStream::new(events_rx).map(|event| {
        let mut line = serde_json::to_vec(&event).unwrap_or_default();
        line.push(b'\n');
        Ok::<_, Infallible>(Bytes::from(line))
    }));

    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

/// Current load snapshot.
async fn get_status(State(state): State<WorkerState>) -> Response {
    Json(state.admission.snapshot()).into_response()
}

/// Cancel a running job. Unknown ids are a soft "not found".
async fn cancel_job(State(state): State<WorkerState>, Path(job_id): Path<String>) -> Response {
    Json(state.admission.cancel(&job_id)).into_response()
}

async fn health(State(state): State<WorkerState>) -> Response {
    Json(json!({
        "status": "ok",
        "worker_id": state.ctx.config.worker_id,
        "version": crate::VERSION,
    }))
    .into_response()
}

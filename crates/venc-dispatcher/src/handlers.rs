//! API handlers: job submission, progress streaming, worker status.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use venc_models::{JobRequest, OutputConfig, WorkerStatus};

use crate::bridge::{self, Subscription};
use crate::client::WorkerClient;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Job creation request body. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateJobRequest {
    pub input_url: String,
    pub preset: String,
    pub output: CreateJobOutput,
}

/// Upload destination in a job creation request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateJobOutput {
    pub storage: String,
    pub path: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Job creation response.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: &'static str,
    pub stream_url: String,
}

/// Accept a job: pick a worker, open the progress bridge, reply 202.
/// The relay to the worker runs asynchronously.
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if req.input_url.trim().is_empty() {
        return Err(ApiError::bad_request("input_url must not be empty"));
    }
    if req.preset.trim().is_empty() {
        return Err(ApiError::bad_request("preset must not be empty"));
    }

    let job_id = Uuid::new_v4().to_string();

    info!(
        job_id = %job_id,
        input_url = %req.input_url,
        preset = %req.preset,
        "Creating job"
    );

    let selected = state.balancer.select_worker().await.map_err(|e| {
        warn!(error = %e, "Failed to select worker");
        metrics::record_job_rejected("no_workers");
        ApiError::ServiceUnavailable("no available workers".to_string())
    })?;

    let tx = state.bridge.create_channel(&job_id);
    metrics::record_job_submitted(&req.preset);

    let job_request = JobRequest {
        job_id: job_id.clone(),
        input_url: req.input_url,
        preset: req.preset,
        output: OutputConfig {
            storage: req.output.storage,
            path: req.output.path,
            metadata: req.output.metadata,
        },
    };

    let bridge = Arc::clone(&state.bridge);
    let relay_job_id = job_id.clone();
    tokio::spawn(async move {
        bridge::run_relay(&bridge, &relay_job_id, selected.client, job_request, tx).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobResponse {
            job_id: job_id.clone(),
            status: "accepted",
            stream_url: format!("/api/v1/jobs/{}/stream", job_id),
        }),
    ))
}

/// Stream a job's progress as server-sent events. Ends on the terminal
/// event or client disconnect; unknown jobs get a single error record.
pub async fn stream_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    info!(job_id = %job_id, "Streaming job progress");
    metrics::record_stream_opened();

    // Intermediaries must not buffer the stream.
    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (header::HeaderName::from_static("x-accel-buffering"), "no"),
    ];

    match state.bridge.subscribe(&job_id) {
        Subscription::Stream(rx) => {
            let events = ReceiverStream::new(rx)
                .map(|event| {
                    Ok::<_, Infallible>(
                        Event::default()
                            .json_data(&event)
                            .unwrap_or_else(|_| Event::default().data("{}")),
                    )
                })
                .boxed();
            (headers, Sse::new(events).keep_alive(KeepAlive::default())).into_response()
        }
        Subscription::NotFound => {
            warn!(job_id = %job_id, "Job not found");
            let events = stream::once(async {
                Ok::<_, Infallible>(Event::default().data("{\"error\":\"job not found\"}"))
            })
            .boxed();
            (headers, Sse::new(events)).into_response()
        }
        Subscription::AlreadyClaimed => {
            warn!(job_id = %job_id, "Progress stream already claimed");
            let events = stream::once(async {
                Ok::<_, Infallible>(Event::default().data("{\"error\":\"stream already claimed\"}"))
            })
            .boxed();
            (headers, Sse::new(events)).into_response()
        }
    }
}

/// One worker's probed state in the admin status view.
#[derive(Debug, Serialize)]
pub struct WorkerProbe {
    pub address: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe every configured worker and report its status.
pub async fn workers_status(State(state): State<AppState>) -> Json<Vec<WorkerProbe>> {
    let probes = state.config.worker_nodes.iter().map(|address| {
        let client = WorkerClient::new(state.http.clone(), address.clone());
        let timeout = state.config.worker_timeout;
        let address = address.clone();
        async move {
            match tokio::time::timeout(timeout, client.get_status()).await {
                Ok(Ok(status)) => WorkerProbe {
                    address,
                    reachable: true,
                    status: Some(status),
                    error: None,
                },
                Ok(Err(e)) => WorkerProbe {
                    address,
                    reachable: false,
                    status: None,
                    error: Some(e.to_string()),
                },
                Err(_) => WorkerProbe {
                    address,
                    reachable: false,
                    status: None,
                    error: Some("probe timed out".to_string()),
                },
            }
        }
    });

    Json(futures_util::future::join_all(probes).await)
}

/// Unauthenticated liveness endpoint.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

//! HTTP client for the worker RPC surface.

use std::pin::Pin;

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;

use venc_models::{CancelResponse, JobRequest, ProgressEvent, WorkerStatus};

/// Errors from worker RPC calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("worker rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to decode worker response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for one worker's RPC surface.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorkerClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the worker's current load.
    pub async fn get_status(&self) -> Result<WorkerStatus, ClientError> {
        let response = self
            .http
            .get(format!("{}/v1/status", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Submit a job and open its progress stream.
    pub async fn submit_job(&self, req: &JobRequest) -> Result<ProgressStream, ClientError> {
        let response = self
            .http
            .post(format!("{}/v1/jobs", self.base_url))
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from));
        Ok(ProgressStream::new(stream))
    }

    /// Cancel a running job on the worker.
    pub async fn cancel_job(&self, job_id: &str) -> Result<CancelResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/v1/jobs/{}/cancel", self.base_url, job_id))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Server stream of progress events, one JSON object per line.
pub struct ProgressStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>,
    buffer: Vec<u8>,
}

impl ProgressStream {
    pub fn new(stream: impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
            buffer: Vec::new(),
        }
    }

    /// Next event, `None` at end of stream.
    pub async fn next_event(&mut self) -> Option<Result<ProgressEvent, ClientError>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                return Some(serde_json::from_slice(line).map_err(ClientError::from));
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
                        return None;
                    }
                    let line = std::mem::take(&mut self.buffer);
                    return Some(serde_json::from_slice(&line).map_err(ClientError::from));
                }
            }
        }
    }
}

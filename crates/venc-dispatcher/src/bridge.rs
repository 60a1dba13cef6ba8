//! Per-job bridge: owns the worker progress stream and fans events out to
//! a single subscriber.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use venc_models::{JobRequest, JobStatus, ProgressEvent};

use crate::client::WorkerClient;
use crate::metrics;

/// Per-job buffer capacity. Absorbs bursts of rapid updates without
/// blocking the worker stream; a full buffer back-pressures the relay
/// (and through it the worker) rather than dropping events, so terminal
/// events always get through.
pub const PROGRESS_BUFFER: usize = 100;

/// Outcome of a subscription attempt.
pub enum Subscription {
    /// The subscriber now owns the job's event stream.
    Stream(mpsc::Receiver<ProgressEvent>),
    /// Someone already claimed this job's stream.
    AlreadyClaimed,
    /// No channel for this job: it never existed, or the relay already
    /// released it.
    NotFound,
}

struct BridgeEntry {
    receiver: Option<mpsc::Receiver<ProgressEvent>>,
}

/// Registry of per-job progress channels.
#[derive(Default)]
pub struct JobBridge {
    entries: Mutex<HashMap<String, BridgeEntry>>,
}

impl JobBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the progress channel for a job, returning the sending half
    /// for the relay. The receiving half waits for a subscriber.
    pub fn create_channel(&self, job_id: &str) -> mpsc::Sender<ProgressEvent> {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        self.entries
            .lock()
            .expect("bridge lock poisoned")
            .insert(job_id.to_string(), BridgeEntry { receiver: Some(rx) });
        tx
    }

    /// Claim the job's event stream. At most one subscriber per job.
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let mut entries = self.entries.lock().expect("bridge lock poisoned");
        match entries.get_mut(job_id) {
            None => Subscription::NotFound,
            Some(entry) => match entry.receiver.take() {
                Some(rx) => Subscription::Stream(rx),
                None => Subscription::AlreadyClaimed,
            },
        }
    }

    /// Release a job's channel. An unclaimed receiver is dropped; a
    /// claimed one sees end-of-stream once the relay's sender goes away.
    pub fn release(&self, job_id: &str) {
        self.entries
            .lock()
            .expect("bridge lock poisoned")
            .remove(job_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Relay a job's worker stream into its progress channel.
///
/// Runs until the worker stream ends or breaks. A transport failure
/// synthesizes a final FAILED event. The channel is always released on
/// exit; a send failing (subscriber claimed the stream and then went
/// away) drops the worker stream, which cancels the job worker-side.
pub async fn run_relay(
    bridge: &JobBridge,
    job_id: &str,
    client: WorkerClient,
    req: JobRequest,
    tx: mpsc::Sender<ProgressEvent>,
) {
    match client.submit_job(&req).await {
        Err(e) => {
            error!(job_id, error = %e, "Failed to submit job");
            metrics::record_job_terminal(JobStatus::Failed);
            let _ = tx
                .send(ProgressEvent::failed(job_id, "Failed to submit job", e.to_string()))
                .await;
        }
        Ok(mut stream) => loop {
            match stream.next_event().await {
                Some(Ok(event)) => {
                    if event.is_terminal() {
                        metrics::record_job_terminal(event.status);
                    }
                    if tx.send(event).await.is_err() {
                        debug!(job_id, "Subscriber gone, dropping worker stream");
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!(job_id, error = %e, "Failed to receive progress");
                    metrics::record_job_terminal(JobStatus::Failed);
                    let _ = tx
                        .send(ProgressEvent::failed(
                            job_id,
                            "Failed to receive progress",
                            e.to_string(),
                        ))
                        .await;
                    break;
                }
                None => break,
            }
        },
    }

    info!(job_id, "Progress relay finished");
    bridge.release(job_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribe_receives_events_until_release() {
        let bridge = JobBridge::new();
        let tx = bridge.create_channel("j1");

        let Subscription::Stream(mut rx) = bridge.subscribe("j1") else {
            panic!("expected stream");
        };

        tx.send(ProgressEvent::queued("j1")).await.unwrap();
        tx.send(ProgressEvent::completed("j1", "file:///x")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Queued);
        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Completed);

        bridge.release("j1");
        drop(tx);
        assert!(rx.recv().await.is_none());
        assert_eq!(bridge.len(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_job() {
        let bridge = JobBridge::new();
        assert!(matches!(bridge.subscribe("ghost"), Subscription::NotFound));
    }

    #[tokio::test]
    async fn test_second_subscriber_rejected() {
        let bridge = JobBridge::new();
        let _tx = bridge.create_channel("j1");

        assert!(matches!(bridge.subscribe("j1"), Subscription::Stream(_)));
        assert!(matches!(bridge.subscribe("j1"), Subscription::AlreadyClaimed));
    }

    #[tokio::test]
    async fn test_subscriber_after_release_sees_not_found() {
        let bridge = JobBridge::new();
        let _tx = bridge.create_channel("j1");
        bridge.release("j1");
        assert!(matches!(bridge.subscribe("j1"), Subscription::NotFound));
    }

    #[tokio::test]
    async fn test_terminal_event_survives_stalled_subscriber() {
        let bridge = JobBridge::new();
        let tx = bridge.create_channel("j1");
        let Subscription::Stream(mut rx) = bridge.subscribe("j1") else {
            panic!("expected stream");
        };

        // Fill past the buffer while the subscriber stalls; the producer
        // must block rather than drop, so the terminal event survives.
        let producer = tokio::spawn(async move {
            for i in 0..PROGRESS_BUFFER + 10 {
                tx.send(ProgressEvent::processing("j1", i as f32 / 2.0, "m"))
                    .await
                    .unwrap();
            }
            tx.send(ProgressEvent::completed("j1", "file:///x")).await.unwrap();
        });

        // Stall, then drain.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        producer.await.unwrap();

        assert_eq!(last.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_relay_synthesizes_failure_on_rejected_submit() {
        use axum::http::StatusCode;
        use axum::routing::post;
        use axum::Router;

        // Worker that rejects every submission.
        let app = Router::new().route(
            "/v1/jobs",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "full") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let bridge = JobBridge::new();
        let tx = bridge.create_channel("j1");
        let Subscription::Stream(mut rx) = bridge.subscribe("j1") else {
            panic!("expected stream");
        };

        let client = WorkerClient::new(reqwest::Client::new(), format!("http://{}", addr));
        let req = JobRequest {
            job_id: "j1".to_string(),
            input_url: "https://example.com/in.mp4".to_string(),
            preset: "720p_h264".to_string(),
            output: venc_models::OutputConfig {
                storage: "local".to_string(),
                path: "out/x.mp4".to_string(),
                metadata: Default::default(),
            },
        };

        run_relay(&bridge, "j1", client, req, tx).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, JobStatus::Failed);
        assert!(event.error.unwrap().contains("429"));
        assert!(rx.recv().await.is_none());
        assert_eq!(bridge.len(), 0);
    }
}

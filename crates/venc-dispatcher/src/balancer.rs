//! Worker selection: round-robin-seeded first-available scan.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::WorkerClient;

/// Every configured worker was unreachable or at capacity.
#[derive(Debug, Error)]
#[error("no available workers (all {0} workers are busy or unreachable)")]
pub struct NoAvailableWorkers(pub usize);

/// A committed selection: the worker's address and an open client to it.
#[derive(Debug)]
pub struct SelectedWorker {
    pub address: String,
    pub client: WorkerClient,
}

/// Selects a worker per job.
///
/// The scan starts one past the last successful selection and commits to
/// the first worker with spare capacity. The cursor advances on success
/// only, so repeated failures do not skew future starts.
pub struct Balancer {
    workers: Vec<String>,
    timeout: Duration,
    last_index: Mutex<i64>,
    http: reqwest::Client,
}

impl Balancer {
    pub fn new(workers: Vec<String>, timeout: Duration, http: reqwest::Client) -> Self {
        Self {
            workers,
            timeout,
            last_index: Mutex::new(-1),
            http,
        }
    }

    /// Probe workers in round-robin order and return the first one with
    /// spare capacity. Each probe gets the full startup timeout; a
    /// stopped worker may be cold-starting behind the probe itself.
    /// Per-probe failures are swallowed; only total exhaustion surfaces.
    pub async fn select_worker(&self) -> Result<SelectedWorker, NoAvailableWorkers> {
        let n = self.workers.len();
        if n == 0 {
            return Err(NoAvailableWorkers(0));
        }

        // Held across the scan so concurrent selections stay consistent.
        let mut last_index = self.last_index.lock().await;
        let start = ((*last_index + 1) as usize) % n;

        for i in 0..n {
            let idx = (start + i) % n;
            let address = &self.workers[idx];

            debug!(worker = %address, attempt = i + 1, "Checking worker availability");

            let client = WorkerClient::new(self.http.clone(), address.clone());
            let status = match tokio::time::timeout(self.timeout, client.get_status()).await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    warn!(worker = %address, error = %e, "Failed to probe worker");
                    continue;
                }
                Err(_) => {
                    warn!(worker = %address, timeout = ?self.timeout, "Worker probe timed out");
                    continue;
                }
            };

            if status.has_capacity() {
                *last_index = idx as i64;
                info!(
                    worker = %address,
                    current_jobs = status.current_jobs,
                    max_jobs = status.max_concurrent_jobs,
                    "Selected worker"
                );
                return Ok(SelectedWorker {
                    address: address.clone(),
                    client,
                });
            }
        }

        Err(NoAvailableWorkers(n))
    }

    #[cfg(test)]
    async fn cursor(&self) -> i64 {
        *self.last_index.lock().await
    }
}

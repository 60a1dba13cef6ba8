//! Job admission: bounded concurrency, per-job cancellation, idle shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use venc_models::{CancelResponse, WorkerStatus};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Guards entry to the pipeline.
///
/// The job counter is a plain atomic so admission checks and shutdown
/// decisions never take the table lock on the hot path; the counter and
/// the table are not updated as a single transaction, so a brief window
/// exists where they disagree. Cancellation of a job whose handle is not
/// yet registered is a no-op, which makes the window harmless.
pub struct JobAdmission {
    max_concurrent: u32,
    active: Arc<AtomicUsize>,
    jobs: RwLock<HashMap<String, watch::Sender<bool>>>,
    worker_id: String,
    version: String,
    disable_idle_shutdown: bool,
    idle_grace: Duration,
    shutdown: watch::Sender<bool>,
}

impl JobAdmission {
    pub fn new(
        max_concurrent: u32,
        worker_id: impl Into<String>,
        version: impl Into<String>,
        disable_idle_shutdown: bool,
        idle_grace: Duration,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            max_concurrent,
            active: Arc::new(AtomicUsize::new(0)),
            jobs: RwLock::new(HashMap::new()),
            worker_id: worker_id.into(),
            version: version.into(),
            disable_idle_shutdown,
            idle_grace,
            shutdown,
        }
    }

    /// Admit a job, registering its cancellation handle. Fails with
    /// `CapacityExhausted` when the worker is full.
    pub fn admit(&self, job_id: &str) -> WorkerResult<watch::Receiver<bool>> {
        let current = self.active.load(Ordering::SeqCst) as u32;
        if current >= self.max_concurrent {
            return Err(WorkerError::CapacityExhausted {
                current,
                max: self.max_concurrent,
            });
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        metrics::set_active_jobs(self.active.load(Ordering::SeqCst));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.jobs
            .write()
            .expect("job table lock poisoned")
            .insert(job_id.to_string(), cancel_tx);

        info!(job_id, current = current + 1, max = self.max_concurrent, "Job admitted");
        Ok(cancel_rx)
    }

    /// Retire a job after its pipeline has exited (success, failure, or
    /// cancellation). The caller must have cleaned up the job workspace
    /// before calling this, so a racing status probe never sees a zero
    /// counter alongside stale job files.
    pub fn retire(self: &Arc<Self>, job_id: &str) {
        self.jobs
            .write()
            .expect("job table lock poisoned")
            .remove(job_id);

        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_active_jobs(remaining);
        info!(job_id, remaining, "Job retired");

        if remaining == 0 {
            self.evaluate_idle_shutdown();
        }
    }

    /// Cancel a running job. Unknown ids are a soft "not found" response.
    pub fn cancel(&self, job_id: &str) -> CancelResponse {
        let notified = {
            let jobs = self.jobs.read().expect("job table lock poisoned");
            jobs.get(job_id).map(|tx| tx.send(true))
        };

        match notified {
            Some(Ok(())) => {
                info!(job_id, "Job cancelled");
                CancelResponse {
                    success: true,
                    message: "job cancelled".to_string(),
                }
            }
            Some(Err(_)) => {
                // Pipeline already gone; retirement will follow shortly.
                CancelResponse {
                    success: true,
                    message: "job already finishing".to_string(),
                }
            }
            None => CancelResponse {
                success: false,
                message: format!("job not found: {}", job_id),
            },
        }
    }

    /// Current load, for status probes.
    pub fn snapshot(&self) -> WorkerStatus {
        let active_job_ids = {
            let jobs = self.jobs.read().expect("job table lock poisoned");
            jobs.keys().cloned().collect()
        };

        WorkerStatus {
            current_jobs: self.active.load(Ordering::SeqCst) as u32,
            max_concurrent_jobs: self.max_concurrent,
            active_job_ids,
            worker_id: self.worker_id.clone(),
            version: self.version.clone(),
        }
    }

    /// After the last job retires, wait out a grace window and shut the
    /// worker down if still idle. The window exists so a rapid succession
    /// of single jobs does not bounce the process; the surrounding
    /// platform restarts a stopped instance on the next request.
    fn evaluate_idle_shutdown(self: &Arc<Self>) {
        if self.disable_idle_shutdown {
            info!("Idle shutdown is disabled");
            return;
        }

        let admission = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(admission.idle_grace).await;

            if admission.active.load(Ordering::SeqCst) == 0 {
                info!("No active jobs, shutting down worker");
                if admission.shutdown.send(true).is_err() {
                    warn!("Shutdown receiver dropped, cannot signal shutdown");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admission(max: u32, disable_shutdown: bool) -> (Arc<JobAdmission>, watch::Receiver<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let admission = Arc::new(JobAdmission::new(
            max,
            "test-worker",
            "0.1.0",
            disable_shutdown,
            Duration::from_millis(50),
            shutdown_tx,
        ));
        (admission, shutdown_rx)
    }

    #[tokio::test]
    async fn test_admit_up_to_capacity() {
        let (admission, _shutdown) = admission(2, true);

        admission.admit("a").unwrap();
        admission.admit("b").unwrap();

        let err = admission.admit("c").unwrap_err();
        assert!(matches!(
            err,
            WorkerError::CapacityExhausted { current: 2, max: 2 }
        ));
    }

    #[tokio::test]
    async fn test_retire_reopens_capacity() {
        let (admission, _shutdown) = admission(1, true);

        admission.admit("a").unwrap();
        assert!(admission.admit("b").is_err());

        admission.retire("a");
        admission.admit("b").unwrap();
    }

    #[tokio::test]
    async fn test_counter_matches_table() {
        let (admission, _shutdown) = admission(4, true);

        admission.admit("a").unwrap();
        admission.admit("b").unwrap();
        admission.admit("c").unwrap();
        admission.retire("b");

        let status = admission.snapshot();
        assert_eq!(status.current_jobs, 2);
        assert_eq!(status.active_job_ids.len(), 2);
        assert!(status.active_job_ids.contains(&"a".to_string()));
        assert!(status.active_job_ids.contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_status_when_idle() {
        let (admission, _shutdown) = admission(2, true);
        let status = admission.snapshot();
        assert_eq!(status.current_jobs, 0);
        assert!(status.active_job_ids.is_empty());
        assert_eq!(status.worker_id, "test-worker");
    }

    #[tokio::test]
    async fn test_cancel_fires_watch() {
        let (admission, _shutdown) = admission(1, true);
        let cancel_rx = admission.admit("a").unwrap();

        let response = admission.cancel("a");
        assert!(response.success);
        assert!(*cancel_rx.borrow());
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_is_soft() {
        let (admission, _shutdown) = admission(1, true);
        let response = admission.cancel("ghost");
        assert!(!response.success);
        assert!(response.message.contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_shutdown_after_grace() {
        let (admission, mut shutdown_rx) = admission(1, false);

        admission.admit("a").unwrap();
        admission.retire("a");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(shutdown_rx.has_changed().unwrap());
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_shutdown_aborted_by_new_job() {
        let (admission, shutdown_rx) = admission(1, false);

        admission.admit("a").unwrap();
        admission.retire("a");

        // A new job arrives inside the grace window.
        admission.admit("b").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!*shutdown_rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_shutdown_disabled() {
        let (admission, shutdown_rx) = admission(1, true);

        admission.admit("a").unwrap();
        admission.retire("a");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!*shutdown_rx.borrow());
    }
}

//! Application state.

use std::sync::Arc;

use crate::balancer::Balancer;
use crate::bridge::JobBridge;
use crate::config::DispatcherConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DispatcherConfig>,
    pub balancer: Arc<Balancer>,
    pub bridge: Arc<JobBridge>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Create new application state from configuration.
    pub fn new(config: DispatcherConfig) -> Self {
        let http = reqwest::Client::new();
        let balancer = Arc::new(Balancer::new(
            config.worker_nodes.clone(),
            config.worker_timeout,
            http.clone(),
        ));

        Self {
            config: Arc::new(config),
            balancer,
            bridge: Arc::new(JobBridge::new()),
            http,
        }
    }
}

//! Dispatcher configuration.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(String);

/// Dispatcher configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Port the client API listens on
    pub port: u16,
    /// Static ordered worker base URLs
    pub worker_nodes: Vec<String>,
    /// Per-worker probe timeout. A stopped worker behind an on-demand
    /// platform wakes on the probe itself, so probes get the full
    /// startup window.
    pub worker_timeout: Duration,
    /// Bearer token required on API routes; auth is disabled when unset
    pub api_key: Option<String>,
}

impl DispatcherConfig {
    /// Create config from environment variables. `WORKER_NODES` is
    /// required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let worker_nodes = std::env::var("WORKER_NODES")
            .map_err(|_| ConfigError("WORKER_NODES environment variable is required".into()))?;
        let worker_nodes: Vec<String> = worker_nodes
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if worker_nodes.is_empty() {
            return Err(ConfigError("WORKER_NODES must list at least one worker".into()));
        }

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            worker_nodes,
            worker_timeout: Duration::from_secs(
                std::env::var("WORKER_STARTUP_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }
}

//! Encoder worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use venc_worker::{
    admission::JobAdmission, create_router, metrics, WorkerConfig, WorkerContext, WorkerState,
    VERSION,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS-backed storage clients)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    init_tracing();

    info!(version = VERSION, "Starting venc-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = tokio::fs::create_dir_all(&config.work_dir).await {
        error!(dir = %config.work_dir.display(), error = %e, "Failed to create work directory");
        std::process::exit(1);
    }

    let uploader = match venc_storage::from_env(&config.storage_backend).await {
        Ok(u) => u,
        Err(e) => {
            error!(backend = %config.storage_backend, error = %e, "Failed to create uploader");
            std::process::exit(1);
        }
    };

    let metrics_handle = metrics::init_metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let admission = Arc::new(JobAdmission::new(
        config.max_concurrent,
        config.worker_id.clone(),
        VERSION,
        config.disable_idle_shutdown,
        config.idle_grace,
        shutdown_tx,
    ));

    let state = WorkerState {
        ctx: Arc::new(WorkerContext::new(config.clone(), uploader)),
        admission,
        metrics_handle: Some(metrics_handle),
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.rpc_port));
    info!("Worker listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await
    {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }

    // Planned exit: the platform interprets this as scale-to-zero.
    info!("Worker shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("venc=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

/// Resolve on SIGINT or on the admission layer's idle-shutdown signal.
async fn shutdown_signal(mut idle: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        changed = idle.changed() => {
            if changed.is_ok() && *idle.borrow() {
                info!("Idle shutdown triggered");
            }
        }
    }
}

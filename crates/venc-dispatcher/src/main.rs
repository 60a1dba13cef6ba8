//! Dispatcher binary.

use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use venc_dispatcher::{create_router, metrics, AppState, DispatcherConfig, VERSION};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for the TLS-backed worker client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    init_tracing();

    info!(version = VERSION, "Starting venc-dispatcher");

    let config = match DispatcherConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!(
        port = config.port,
        workers = ?config.worker_nodes,
        worker_timeout = ?config.worker_timeout,
        auth = config.api_key.is_some(),
        "Dispatcher configuration"
    );

    let metrics_handle = metrics::init_metrics();
    let state = AppState::new(config.clone());
    let app = create_router(state, Some(metrics_handle));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Dispatcher listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }

    info!("Dispatcher shutdown complete");
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

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}

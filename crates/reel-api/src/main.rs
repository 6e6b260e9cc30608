//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use reel_api::{create_router, metrics, ApiConfig, Runtime};
use reel_worker::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+); a second
    // install attempt is harmless
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing("reel=info,tower_http=info");

    info!("Starting reel-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let Runtime {
        state,
        embedded_worker,
        sweeper,
    } = Runtime::from_env(config.clone()).await?;

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let shutdown = CancellationToken::new();

    let worker_task = embedded_worker.map(|worker| {
        let token = shutdown.clone();
        tokio::spawn(async move {
            let worker_shutdown = worker.shutdown_token();
            tokio::spawn(async move {
                token.cancelled().await;
                worker_shutdown.cancel();
            });
            if let Err(e) = worker.run().await {
                error!("Embedded worker error: {}", e);
            }
        })
    });

    if let Some(sweeper) = sweeper {
        let token = shutdown.clone();
        tokio::spawn(async move { sweeper.run(token).await });
    }

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Let the embedded worker finish what it started
    shutdown.cancel();
    if let Some(task) = worker_task {
        task.await.ok();
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
    shutdown.cancel();
}

//! Video generation worker binary.

use std::sync::Arc;

use tracing::{error, info};

use reel_queue::{JobQueue, QueueConfig, RedisStatusStore, StoreConfig};
use reel_storage::DeliveryConfig;
use reel_worker::{init_tracing, ContentOrchestrator, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS); a second
    // install attempt is harmless
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing("reel=info");

    info!("Starting reel-worker");

    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    let (Some(queue_config), Some(store_config)) = (QueueConfig::from_env(), StoreConfig::from_env()) else {
        error!("REDIS_URL is not set; the API runs an embedded worker in that case");
        return Ok(());
    };

    let queue = JobQueue::new(queue_config)?;
    queue.init().await?;
    let store = RedisStatusStore::new(store_config)?;

    let delivery = DeliveryConfig::from_env()?.build()?;
    if let Err(e) = delivery.check().await {
        error!("Artifact storage check failed: {}", e);
        return Err(e.into());
    }
    info!(durable = delivery.is_durable(), "Artifact delivery ready");

    let orchestrator = ContentOrchestrator::from_config(&config)?;

    tokio::fs::create_dir_all(&config.work_dir).await?;

    let executor = JobExecutor::new(
        config,
        Arc::new(queue),
        Arc::new(store),
        Arc::new(orchestrator),
        delivery,
    );

    let shutdown = executor.shutdown_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.cancel();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        return Err(e.into());
    }

    info!("Worker shutdown complete");
    Ok(())
}

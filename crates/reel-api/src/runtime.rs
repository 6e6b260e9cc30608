//! Backend wiring.
//!
//! With `REDIS_URL` the API only submits and reads; separate worker
//! processes generate. Without it the API runs an in-memory queue and store
//! and hosts the worker itself.

use std::sync::Arc;

use anyhow::Context;
use reel_queue::{
    JobQueue, JobStatusStore, MemoryQueue, MemoryStatusStore, QueueConfig, RedisStatusStore, StoreConfig, WorkQueue,
    JOB_STATUS_TTL_SECS,
};
use reel_storage::{DeliveryConfig, LocalVideoStore};
use reel_worker::{ContentOrchestrator, JobExecutor, WorkerConfig};
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::services::StaleStatusSweeper;
use crate::state::AppState;

/// Everything `main` needs to serve.
pub struct Runtime {
    pub state: AppState,
    /// In-process worker, present when no queue connection string is set
    pub embedded_worker: Option<JobExecutor>,
    /// Expiry of in-memory status records
    pub sweeper: Option<StaleStatusSweeper>,
}

impl Runtime {
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let delivery_config = DeliveryConfig::from_env().context("invalid storage configuration")?;
        let delivery = delivery_config.build().context("artifact delivery unavailable")?;
        let videos = LocalVideoStore::new(&delivery_config.local_dir);

        match (QueueConfig::from_env(), StoreConfig::from_env()) {
            (Some(queue_config), Some(store_config)) => {
                let queue = JobQueue::new(queue_config)?;
                queue.init().await.context("failed to initialise job stream")?;
                let store = RedisStatusStore::new(store_config)?;
                info!("Using Redis queue and status store; generation runs in reel-worker");

                Ok(Self {
                    state: AppState::new(config, Arc::new(store), Arc::new(queue), videos, delivery),
                    embedded_worker: None,
                    sweeper: None,
                })
            }
            _ => {
                warn!("REDIS_URL not set; running embedded queue, status store and worker (single instance only)");

                let worker_config = WorkerConfig::from_env();
                worker_config.validate()?;
                tokio::fs::create_dir_all(&worker_config.work_dir).await?;
                let orchestrator = ContentOrchestrator::from_config(&worker_config)?;

                let queue = Arc::new(MemoryQueue::new());
                let store = Arc::new(MemoryStatusStore::new());
                let ttl_secs = std::env::var("REEL_STATUS_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(JOB_STATUS_TTL_SECS);

                let worker = JobExecutor::new(
                    worker_config,
                    queue.clone() as Arc<dyn WorkQueue>,
                    store.clone() as Arc<dyn JobStatusStore>,
                    Arc::new(orchestrator),
                    delivery.clone(),
                );

                Ok(Self {
                    state: AppState::new(config, store.clone(), queue, videos, delivery),
                    embedded_worker: Some(worker),
                    sweeper: Some(StaleStatusSweeper::new(store, ttl_secs)),
                })
            }
        }
    }
}

//! Job queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, GenerateVideoJob};

/// How long a job id stays reserved after enqueue.
const DEDUP_TTL_SECS: u64 = 3600;

/// A channel of generation requests with at-least-once delivery.
///
/// A delivery stays owned by its consumer until acknowledged. Deliveries
/// that are never acknowledged (worker crash) become claimable again after
/// an idle period, so a job may be handed out more than once.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a job. Returns the queue message id.
    async fn enqueue(&self, job: &GenerateVideoJob) -> QueueResult<String>;

    /// Wait up to `block` for new deliveries for `consumer`.
    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a delivery; it will not be handed out again.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Take over deliveries that have not been acknowledged for `min_idle`.
    async fn claim_stale(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>>;

    /// Reset the idle time of a delivery owned by `consumer` so a job that is
    /// still running is not claimed by [`Self::claim_stale`].
    async fn heartbeat(&self, consumer: &str, message_id: &str) -> QueueResult<()>;

    /// Number of entries not yet acknowledged.
    async fn len(&self) -> QueueResult<u64>;

    /// Connectivity check.
    async fn ping(&self) -> QueueResult<()>;
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "reel:jobs".to_string(),
            consumer_group: "reel-workers".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    ///
    /// Returns `None` when `REDIS_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            redis_url,
            stream_name: std::env::var("REEL_STREAM_NAME").unwrap_or_else(|_| "reel:jobs".to_string()),
            consumer_group: std::env::var("REEL_CONSUMER_GROUP")
                .unwrap_or_else(|_| "reel-workers".to_string()),
        })
    }
}

/// Redis Streams job queue.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Parse stream entries, acknowledging any that cannot be decoded.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());

        for entry in entries {
            let message_id = entry.id.clone();
            let payload: Option<String> = entry.get("job");

            let parsed = payload
                .as_deref()
                .map(serde_json::from_str::<GenerateVideoJob>);

            match parsed {
                Some(Ok(job)) => deliveries.push(Delivery { message_id, job }),
                Some(Err(e)) => {
                    warn!("Failed to parse job payload {}: {}", message_id, e);
                    self.ack(&message_id).await.ok();
                }
                None => {
                    warn!("Stream entry {} has no job payload", message_id);
                    self.ack(&message_id).await.ok();
                }
            }
        }

        deliveries
    }
}

#[async_trait]
impl WorkQueue for JobQueue {
    async fn enqueue(&self, job: &GenerateVideoJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        // Reserve the job id; a second enqueue of the same id is rejected
        let dedup_key = format!("reel:dedup:{}", idempotency_key);
        let reserved: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if reserved.is_none() {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(job.job_id.clone()));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!("Enqueued job {} with message ID {}", job.job_id, message_id);
        Ok(message_id)
    }

    async fn consume(&self, consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::DequeueFailed(e.to_string()))?;

        let entries: Vec<StreamId> = reply
            .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default();

        let deliveries = self.decode_entries(entries).await;
        for delivery in &deliveries {
            debug!("Consumed job {} from stream", delivery.job.job_id);
        }
        Ok(deliveries)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    async fn claim_stale(&self, consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let deliveries = self.decode_entries(reply.claimed).await;
        for delivery in &deliveries {
            info!("Claimed stale job {} from stream", delivery.job.job_id);
        }
        Ok(deliveries)
    }

    async fn heartbeat(&self, consumer: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // min-idle 0 always matches; JUSTID resets idle time without
        // bumping the delivery counter.
        let refreshed: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        if refreshed.is_empty() {
            debug!("Delivery {} is no longer pending", message_id);
        }
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

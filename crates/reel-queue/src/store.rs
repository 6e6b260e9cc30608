//! Job status store.
//!
//! The store is the single source of truth for job state. Transition rules
//! live in [`JobRecord::apply`]; backends only have to make each
//! read-apply-write cycle atomic per job id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_models::{JobId, JobRecord, Transition, TransitionOutcome};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Default record lifetime (stale status cleanup).
pub const JOB_STATUS_TTL_SECS: u64 = 24 * 60 * 60;

/// Attempts before a compare-and-set loop gives up.
const MAX_CAS_ATTEMPTS: usize = 16;

#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Insert a queued record. Fails with `AlreadyExists` on id reuse.
    async fn create(&self, job_id: &JobId, requested_at: DateTime<Utc>) -> StoreResult<JobRecord>;

    /// Atomically apply a transition to an existing record.
    async fn transition(&self, job_id: &JobId, transition: Transition) -> StoreResult<TransitionOutcome>;

    /// Current snapshot, or `NotFound`.
    async fn get(&self, job_id: &JobId) -> StoreResult<JobRecord>;

    /// Connectivity check.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn set_generating(&self, job_id: &JobId) -> StoreResult<TransitionOutcome> {
        self.transition(job_id, Transition::Generating).await
    }

    /// Late or backwards progress is ignored, never an error.
    async fn update_progress(&self, job_id: &JobId, percent: u8) -> StoreResult<TransitionOutcome> {
        self.transition(job_id, Transition::Progress(percent)).await
    }

    async fn set_ready(&self, job_id: &JobId, reference: &str) -> StoreResult<TransitionOutcome> {
        self.transition(
            job_id,
            Transition::Ready {
                reference: reference.to_string(),
            },
        )
        .await
    }

    async fn set_failed(&self, job_id: &JobId, reason: &str) -> StoreResult<TransitionOutcome> {
        self.transition(
            job_id,
            Transition::Failed {
                reason: reason.to_string(),
            },
        )
        .await
    }
}

/// Status store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,
    pub key_prefix: String,
    pub ttl_secs: u64,
}

impl StoreConfig {
    /// Create config from environment variables.
    ///
    /// Returns `None` when `REDIS_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            redis_url,
            key_prefix: "reel:job".to_string(),
            ttl_secs: std::env::var("REEL_STATUS_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(JOB_STATUS_TTL_SECS),
        })
    }
}

const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'record', ARGV[1], 'version', 0)
redis.call('EXPIRE', KEYS[1], ARGV[2])
return 1
"#;

// Writes the new record only if nobody else wrote since it was read.
const CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if current == false then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'record', ARGV[2], 'version', tonumber(ARGV[1]) + 1)
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
"#;

/// Redis-backed status store.
///
/// Each job is a hash `{record, version}`. Transitions read the pair, apply
/// the transition in Rust and write back through a version-checked script,
/// retrying when another writer got there first. Readers only ever see a
/// whole record.
pub struct RedisStatusStore {
    client: redis::Client,
    config: StoreConfig,
    create_script: redis::Script,
    cas_script: redis::Script,
}

impl RedisStatusStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            create_script: redis::Script::new(CREATE_SCRIPT),
            cas_script: redis::Script::new(CAS_SCRIPT),
        })
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.config.key_prefix, job_id)
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn read(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &JobId,
    ) -> StoreResult<(JobRecord, String)> {
        let (record, version): (Option<String>, Option<String>) = redis::cmd("HMGET")
            .arg(self.key(job_id))
            .arg("record")
            .arg("version")
            .query_async(conn)
            .await?;

        match (record, version) {
            (Some(record), Some(version)) => Ok((serde_json::from_str(&record)?, version)),
            _ => Err(StoreError::NotFound(job_id.clone())),
        }
    }
}

#[async_trait]
impl JobStatusStore for RedisStatusStore {
    async fn create(&self, job_id: &JobId, requested_at: DateTime<Utc>) -> StoreResult<JobRecord> {
        let mut conn = self.connection().await?;
        let record = JobRecord::new(job_id.clone(), requested_at);

        let created: i64 = self
            .create_script
            .key(self.key(job_id))
            .arg(serde_json::to_string(&record)?)
            .arg(self.config.ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(StoreError::AlreadyExists(job_id.clone()));
        }
        debug!(job_id = %job_id, "Created job status record");
        Ok(record)
    }

    async fn transition(&self, job_id: &JobId, transition: Transition) -> StoreResult<TransitionOutcome> {
        let mut conn = self.connection().await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let (mut record, version) = self.read(&mut conn, job_id).await?;
            let outcome = record.apply(&transition, Utc::now())?;
            if !outcome.is_applied() {
                return Ok(outcome);
            }

            let written: i64 = self
                .cas_script
                .key(self.key(job_id))
                .arg(&version)
                .arg(serde_json::to_string(&record)?)
                .arg(self.config.ttl_secs)
                .invoke_async(&mut conn)
                .await?;

            match written {
                1 => return Ok(outcome),
                -1 => return Err(StoreError::NotFound(job_id.clone())),
                _ => debug!(job_id = %job_id, "Status write raced, retrying"),
            }
        }

        warn!(job_id = %job_id, "Gave up applying {:?} after {} attempts", transition, MAX_CAS_ATTEMPTS);
        Err(StoreError::Contention(job_id.clone()))
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<JobRecord> {
        let mut conn = self.connection().await?;
        let (record, _) = self.read(&mut conn, job_id).await?;
        Ok(record)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

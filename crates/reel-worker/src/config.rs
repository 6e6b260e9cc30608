//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs (N)
    pub concurrency: usize,
    /// Deadline for one generation
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root of per-job work directories
    pub work_dir: PathBuf,
    /// How long one queue read blocks
    pub consume_block: Duration,
    /// How often the worker should scan for abandoned deliveries
    pub claim_interval: Duration,
    /// Minimum idle time before a pending delivery can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Interval for refreshing delivery ownership while a job runs (prevents premature reclamation)
    pub job_heartbeat_interval: Duration,
    /// Deadline for handing the rendered file to delivery
    pub delivery_timeout: Duration,
    /// Root of the background footage library
    pub assets_dir: PathBuf,
    /// External story service, if any
    pub story_service_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            job_timeout: Duration::from_millis(180_000),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/reel"),
            consume_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(60),
            claim_min_idle: Duration::from_secs(600),
            job_heartbeat_interval: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(300),
            assets_dir: PathBuf::from("./assets"),
            story_service_url: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            job_timeout: Duration::from_millis(
                std::env::var("WORKER_JOB_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(180_000),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/reel".to_string())
                .into(),
            consume_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(60),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            job_heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_JOB_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(30),
            ),
            delivery_timeout: Duration::from_secs(
                std::env::var("WORKER_DELIVERY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(300),
            ),
            assets_dir: std::env::var("WORKER_ASSETS_DIR")
                .unwrap_or_else(|_| "./assets".to_string())
                .into(),
            story_service_url: std::env::var("STORY_SERVICE_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Reject settings under which a live job could be reclaimed.
    ///
    /// A running job refreshes its delivery every heartbeat, and a job whose
    /// heartbeats stop is still bounded by its deadline plus delivery, so
    /// both must fit inside the claim idle threshold.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.job_heartbeat_interval.is_zero() || self.job_heartbeat_interval >= self.claim_min_idle {
            return Err(WorkerError::config_error(format!(
                "WORKER_JOB_HEARTBEAT_SECS ({:?}) must be non-zero and below WORKER_CLAIM_MIN_IDLE_SECS ({:?})",
                self.job_heartbeat_interval, self.claim_min_idle
            )));
        }
        let busiest = self.job_timeout + self.delivery_timeout;
        if self.claim_min_idle <= busiest {
            return Err(WorkerError::config_error(format!(
                "WORKER_CLAIM_MIN_IDLE_SECS ({:?}) must exceed the job deadline plus delivery timeout ({:?})",
                self.claim_min_idle, busiest
            )));
        }
        Ok(())
    }

    /// Work directory private to one job.
    pub fn job_dir(&self, job_id: &reel_models::JobId) -> PathBuf {
        self.work_dir.join(job_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.job_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_default_config_is_valid() {
        tokio_test::assert_ok!(WorkerConfig::default().validate());
    }

    #[test]
    fn test_claim_idle_must_exceed_deadline_and_delivery() {
        let config = WorkerConfig {
            job_timeout: Duration::from_secs(180),
            delivery_timeout: Duration::from_secs(300),
            claim_min_idle: Duration::from_secs(480),
            ..WorkerConfig::default()
        };
        let err = tokio_test::assert_err!(config.validate());
        assert!(err.to_string().contains("WORKER_CLAIM_MIN_IDLE_SECS"));
    }

    #[test]
    fn test_heartbeat_must_be_below_claim_idle() {
        let config = WorkerConfig {
            job_heartbeat_interval: Duration::from_secs(600),
            ..WorkerConfig::default()
        };
        let err = tokio_test::assert_err!(config.validate());
        assert!(err.to_string().contains("WORKER_JOB_HEARTBEAT_SECS"));
    }

    #[test]
    fn test_job_dirs_are_distinct() {
        let config = WorkerConfig::default();
        let a = config.job_dir(&reel_models::JobId::from_string("a"));
        let b = config.job_dir(&reel_models::JobId::from_string("b"));
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/reel"));
    }
}

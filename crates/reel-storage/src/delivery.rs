//! Artifact delivery.
//!
//! Turns a finished local file into a reference clients can play: an R2
//! public URL when durable storage is configured, otherwise a path under the
//! local streaming endpoint.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reel_models::JobId;
use tracing::{info, warn};

use crate::client::{R2Client, R2Config};
use crate::error::{StorageError, StorageResult};
use crate::local::LocalVideoStore;

/// Content type of every delivered artifact.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Durable object key for a job's video.
pub fn video_key(job_id: &JobId) -> String {
    format!("videos/{}.mp4", job_id)
}

#[async_trait]
pub trait ArtifactDelivery: Send + Sync {
    /// Persist or expose `local` and return the reference stored on the job.
    ///
    /// Failures are returned to the caller; implementations never fall back
    /// to a different backend.
    async fn deliver(&self, local: &Path, job_id: &JobId) -> StorageResult<String>;

    /// Whether references survive this instance.
    fn is_durable(&self) -> bool;

    /// Connectivity check for readiness probes.
    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Uploads to R2 under `videos/{jobId}.mp4`.
pub struct R2Delivery {
    client: R2Client,
}

impl R2Delivery {
    pub fn new(client: R2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactDelivery for R2Delivery {
    async fn deliver(&self, local: &Path, job_id: &JobId) -> StorageResult<String> {
        let key = video_key(job_id);
        self.client.upload_file(local, &key, VIDEO_CONTENT_TYPE).await?;
        Ok(self.client.config().public_url(&key))
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn check(&self) -> StorageResult<()> {
        self.client.check_connectivity().await
    }
}

/// Moves the file into the local serving directory.
pub struct LocalDelivery {
    store: LocalVideoStore,
}

impl LocalDelivery {
    pub fn new(store: LocalVideoStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LocalVideoStore {
        &self.store
    }
}

#[async_trait]
impl ArtifactDelivery for LocalDelivery {
    async fn deliver(&self, local: &Path, job_id: &JobId) -> StorageResult<String> {
        if !local.exists() {
            return Err(StorageError::not_found(local.display().to_string()));
        }
        let stored = self.store.store(local, job_id).await?;
        info!(job_id = %job_id, "Serving {} locally", stored.display());
        Ok(LocalVideoStore::url_for(job_id))
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Delivery backend selection.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub r2: Option<R2Config>,
    pub local_dir: String,
    /// Refuse to start without durable storage
    pub require_durable: bool,
}

impl DeliveryConfig {
    /// Create config from environment variables.
    ///
    /// A partial R2 configuration is an error rather than a silent fallback.
    pub fn from_env() -> StorageResult<Self> {
        let r2 = if R2Config::is_requested() {
            Some(R2Config::from_env()?)
        } else {
            None
        };
        Ok(Self {
            r2,
            local_dir: std::env::var("LOCAL_VIDEO_DIR").unwrap_or_else(|_| "/tmp/reel/videos".to_string()),
            require_durable: std::env::var("REQUIRE_DURABLE_STORAGE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Build the configured backend.
    pub fn build(&self) -> StorageResult<Arc<dyn ArtifactDelivery>> {
        match &self.r2 {
            Some(r2) => {
                info!("Artifact delivery: R2 bucket {}", r2.bucket_name);
                Ok(Arc::new(R2Delivery::new(R2Client::new(r2.clone()))))
            }
            None if self.require_durable => Err(StorageError::config_error(
                "REQUIRE_DURABLE_STORAGE is set but R2 is not configured",
            )),
            None => {
                warn!(
                    "R2 not configured, serving videos from {}; references are only valid on this instance",
                    self.local_dir
                );
                Ok(Arc::new(LocalDelivery::new(LocalVideoStore::new(&self.local_dir))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_video_key() {
        assert_eq!(video_key(&JobId::from_string("j1")), "videos/j1.mp4");
    }

    #[test]
    fn test_require_durable_fails_fast() {
        let config = DeliveryConfig {
            r2: None,
            local_dir: "/tmp/reel/videos".to_string(),
            require_durable: true,
        };
        assert!(matches!(config.build(), Err(StorageError::ConfigError(_))));

        let relaxed = DeliveryConfig {
            require_durable: false,
            ..config
        };
        assert!(!relaxed.build().unwrap().is_durable());
    }

    #[tokio::test]
    async fn test_local_delivery_reference() {
        let work = TempDir::new().unwrap();
        let serve = TempDir::new().unwrap();
        let src = work.path().join("output.mp4");
        tokio::fs::write(&src, b"mp4").await.unwrap();

        let delivery = LocalDelivery::new(LocalVideoStore::new(serve.path()));
        let id = JobId::from_string("job-7");
        let reference = delivery.deliver(&src, &id).await.unwrap();

        assert_eq!(reference, "/videos/job-7.mp4");
        assert!(serve.path().join("job-7.mp4").exists());
    }

    #[tokio::test]
    async fn test_local_delivery_missing_file() {
        let serve = TempDir::new().unwrap();
        let delivery = LocalDelivery::new(LocalVideoStore::new(serve.path()));
        let result = delivery.deliver(Path::new("/nonexistent/out.mp4"), &JobId::new()).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}

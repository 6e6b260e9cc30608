//! Job executor.
//!
//! Pulls deliveries from the queue, runs at most `concurrency` jobs at once
//! and drives every job it starts to a terminal status.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reel_models::{JobId, TransitionOutcome};
use reel_queue::{Delivery, JobStatusStore, StoreError, WorkQueue};
use reel_storage::{ArtifactDelivery, StorageError};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::orchestrator::{ContentOrchestrator, StageReporter};
use crate::retry::{retry_async, FailureTracker, RetryConfig};

/// Progress written once the job has started.
pub const PROGRESS_STARTED: u8 = 5;
/// Progress written once the video is rendered, before delivery.
pub const PROGRESS_RENDERED: u8 = 95;

/// Collaborators shared by every job.
struct JobContext {
    config: WorkerConfig,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn JobStatusStore>,
    orchestrator: Arc<ContentOrchestrator>,
    delivery: Arc<dyn ArtifactDelivery>,
    consumer_name: String,
    /// Message ids of deliveries running in this executor.
    active: Mutex<HashSet<String>>,
}

impl JobContext {
    fn active(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_active(&self, message_id: &str) -> bool {
        self.active().contains(message_id)
    }
}

/// Marks a delivery as running here until dropped.
struct ActiveDelivery {
    ctx: Arc<JobContext>,
    message_id: String,
}

impl ActiveDelivery {
    /// `None` if the delivery is already running in this executor.
    fn register(ctx: &Arc<JobContext>, message_id: &str) -> Option<Self> {
        if !ctx.active().insert(message_id.to_string()) {
            return None;
        }
        Some(Self {
            ctx: Arc::clone(ctx),
            message_id: message_id.to_string(),
        })
    }
}

impl Drop for ActiveDelivery {
    fn drop(&mut self) {
        self.ctx.active().remove(&self.message_id);
    }
}

/// Refreshes delivery ownership while a job runs; stops when dropped.
struct Heartbeat(JoinHandle<()>);

impl Heartbeat {
    fn start(ctx: &Arc<JobContext>, message_id: &str, job_id: &JobId) -> Self {
        let ctx = Arc::clone(ctx);
        let message_id = message_id.to_string();
        let job_id = job_id.clone();
        Self(tokio::spawn(async move {
            let period = ctx.config.job_heartbeat_interval.max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = ctx.queue.heartbeat(&ctx.consumer_name, &message_id).await {
                    warn!(job_id = %job_id, "Delivery heartbeat failed: {}", e);
                }
            }
        }))
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn JobStatusStore>,
        orchestrator: Arc<ContentOrchestrator>,
        delivery: Arc<dyn ArtifactDelivery>,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        Self {
            ctx: Arc::new(JobContext {
                config,
                queue,
                store,
                orchestrator,
                delivery,
                consumer_name: consumer_name.clone(),
                active: Mutex::new(HashSet::new()),
            }),
            job_semaphore: Arc::new(Semaphore::new(concurrency)),
            shutdown: CancellationToken::new(),
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Token that stops [`Self::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Consume until shutdown, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        let concurrency = self.ctx.config.concurrency.max(1);
        info!(
            "Starting job executor '{}' with {} max concurrent jobs, {:?} deadline",
            self.consumer_name, concurrency, self.ctx.config.job_timeout
        );

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.ctx),
            Arc::clone(&self.job_semaphore),
            self.shutdown.clone(),
            self.consumer_name.clone(),
        ));

        let mut failures = FailureTracker::new(5);
        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                    permit.map_err(|_| WorkerError::config_error("job semaphore closed"))?
                }
            };

            let consumed = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                consumed = self.ctx.queue.consume(&self.consumer_name, self.ctx.config.consume_block, 1) => consumed,
            };

            match consumed {
                Ok(deliveries) => {
                    failures.record_success();
                    // count is 1, so at most one delivery per permit
                    if let Some(delivery) = deliveries.into_iter().next() {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            let _permit = permit;
                            Self::execute_job(ctx, delivery).await;
                        });
                    }
                }
                Err(e) => {
                    drop(permit);
                    if failures.record_failure() {
                        error!("Error consuming jobs: {}", e);
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let all = u32::try_from(concurrency).unwrap_or(u32::MAX);
        match tokio::time::timeout(self.ctx.config.shutdown_timeout, self.job_semaphore.acquire_many(all)).await {
            Ok(_) => info!("Job executor stopped"),
            Err(_) => warn!(
                "Shutdown timeout reached with jobs still running; their deliveries stay pending and will be reclaimed"
            ),
        }
        Ok(())
    }

    /// Periodically take over deliveries abandoned by crashed workers.
    async fn claim_loop(
        ctx: Arc<JobContext>,
        semaphore: Arc<Semaphore>,
        shutdown: CancellationToken,
        consumer_name: String,
    ) {
        let mut interval = tokio::time::interval(ctx.config.claim_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let available = semaphore.available_permits();
            if available == 0 {
                continue;
            }

            let claimed = match ctx
                .queue
                .claim_stale(&consumer_name, ctx.config.claim_min_idle, available)
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!("Failed to claim stale deliveries: {}", e);
                    continue;
                }
            };
            if claimed.is_empty() {
                continue;
            }

            info!("Claimed {} stale deliveries", claimed.len());
            for delivery in claimed {
                if ctx.is_active(&delivery.message_id) {
                    debug!(job_id = %delivery.job.job_id, "Claimed delivery is already running here");
                    continue;
                }
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return;
                };
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let _permit = permit;
                    Self::execute_job(ctx, delivery).await;
                });
            }
        }
    }

    /// Run one delivery to completion. Never returns an error: every failure
    /// ends in a terminal status write or, if that write is impossible, in
    /// leaving the delivery pending for redelivery.
    async fn execute_job(ctx: Arc<JobContext>, delivery: Delivery) {
        let job_id = delivery.job.job_id.clone();
        let Some(_active) = ActiveDelivery::register(&ctx, &delivery.message_id) else {
            debug!(job_id = %job_id, "Delivery {} is already running here", delivery.message_id);
            return;
        };
        let logger = JobLogger::new(&job_id, "generate_video");
        let span = logger.create_span();

        async {
            let _heartbeat = Heartbeat::start(&ctx, &delivery.message_id, &job_id);

            match ctx.store.set_generating(&job_id).await {
                Ok(TransitionOutcome::Applied) => {}
                Ok(TransitionOutcome::Ignored) => {
                    // Redelivered: either still generating elsewhere (crashed
                    // worker) or already terminal.
                    match ctx.store.get(&job_id).await {
                        Ok(record) if record.is_terminal() => {
                            metrics::record_duplicate_delivery();
                            logger.log_warning(&format!("duplicate delivery of {} job, acknowledging", record.state));
                            Self::ack(&ctx, &delivery.message_id, &job_id).await;
                            return;
                        }
                        Ok(_) => logger.log_warning("resuming job left generating by another worker"),
                        Err(e) => {
                            logger.log_error(&format!("status read failed, leaving delivery pending: {}", e));
                            return;
                        }
                    }
                }
                Err(StoreError::NotFound(_)) => {
                    logger.log_error("no status record (expired or never created), dropping delivery");
                    Self::ack(&ctx, &delivery.message_id, &job_id).await;
                    return;
                }
                Err(e) => {
                    logger.log_error(&format!("could not start job, leaving delivery pending: {}", e));
                    return;
                }
            }

            logger.log_start("generating video");
            metrics::record_job_started();
            Self::write_progress(&ctx, &job_id, PROGRESS_STARTED).await;

            let work_dir = ctx.config.job_dir(&job_id);
            let outcome = Self::run_pipeline(&ctx, &delivery, &work_dir, &logger).await;

            let written = match &outcome {
                Ok(reference) => Self::finish_ready(&ctx, &job_id, reference).await,
                Err(e) => Self::finish_failed(&ctx, &job_id, &e.client_message()).await,
            };

            match &outcome {
                Ok(reference) => {
                    metrics::record_job_ready(logger.elapsed_secs());
                    logger.log_completion(&format!("ready at {}", reference));
                }
                Err(e) => {
                    metrics::record_job_failed(e.reason_label());
                    logger.log_error(&e.to_string());
                }
            }

            if written {
                Self::ack(&ctx, &delivery.message_id, &job_id).await;
            } else {
                error!(job_id = %job_id, "Terminal status write failed; delivery left pending for reclaim");
            }

            if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    logger.log_warning(&format!("failed to remove work dir {}: {}", work_dir.display(), e));
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Generate under the deadline, then deliver. Returns the artifact reference.
    async fn run_pipeline(
        ctx: &JobContext,
        delivery: &Delivery,
        work_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<String> {
        let job = &delivery.job;

        // A redelivered job may find a previous attempt's files.
        if tokio::fs::metadata(work_dir).await.is_ok() {
            tokio::fs::remove_dir_all(work_dir).await?;
        }
        tokio::fs::create_dir_all(work_dir).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StageReporter::new(tx);
        let forwarder = {
            let store = Arc::clone(&ctx.store);
            let job_id = job.job_id.clone();
            let logger = logger.clone();
            tokio::spawn(async move {
                while let Some(stage) = rx.recv().await {
                    logger.log_progress(stage.as_str());
                    if let Err(e) = store.update_progress(&job_id, stage.progress()).await {
                        debug!(job_id = %job_id, "Progress write failed: {}", e);
                    }
                }
            })
        };

        let cancel = CancellationToken::new();
        let deadline = ctx.config.job_timeout;
        let generated = tokio::time::timeout(
            deadline,
            ctx.orchestrator
                .generate(&job.job_id, &job.options, work_dir, &reporter, &cancel),
        )
        .await;

        drop(reporter);
        let _ = forwarder.await;

        let output = match generated {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                // The generate future is already dropped; the token stops
                // anything it spawned that outlives it.
                cancel.cancel();
                return Err(WorkerError::TimeoutExceeded(deadline.as_millis() as u64));
            }
        };

        Self::write_progress(ctx, &job.job_id, PROGRESS_RENDERED).await;

        let started = Instant::now();
        let reference = match tokio::time::timeout(
            ctx.config.delivery_timeout,
            ctx.delivery.deliver(&output, &job.job_id),
        )
        .await
        {
            Ok(delivered) => delivered.map_err(WorkerError::DeliveryFailed)?,
            Err(_) => {
                return Err(WorkerError::DeliveryFailed(StorageError::upload_failed(format!(
                    "delivery timed out after {:?}",
                    ctx.config.delivery_timeout
                ))))
            }
        };
        metrics::record_delivery(started.elapsed().as_secs_f64());

        Ok(reference)
    }

    async fn write_progress(ctx: &JobContext, job_id: &JobId, percent: u8) {
        if let Err(e) = ctx.store.update_progress(job_id, percent).await {
            warn!(job_id = %job_id, "Progress write failed: {}", e);
        }
    }

    async fn finish_ready(ctx: &JobContext, job_id: &JobId, reference: &str) -> bool {
        let config = RetryConfig::new("set_ready").with_max_retries(5);
        let result = retry_async(&config, StoreError::is_retryable, || ctx.store.set_ready(job_id, reference)).await;
        Self::terminal_written(job_id, result)
    }

    async fn finish_failed(ctx: &JobContext, job_id: &JobId, reason: &str) -> bool {
        let config = RetryConfig::new("set_failed").with_max_retries(5);
        let result = retry_async(&config, StoreError::is_retryable, || ctx.store.set_failed(job_id, reason)).await;
        Self::terminal_written(job_id, result)
    }

    fn terminal_written(job_id: &JobId, result: Result<TransitionOutcome, StoreError>) -> bool {
        match result {
            Ok(TransitionOutcome::Applied) => true,
            Ok(TransitionOutcome::Ignored) => {
                info!(job_id = %job_id, "Job already terminal; keeping the first result");
                true
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to write terminal status: {}", e);
                false
            }
        }
    }

    async fn ack(ctx: &JobContext, message_id: &str, job_id: &JobId) {
        if let Err(e) = ctx.queue.ack(message_id).await {
            error!(job_id = %job_id, "Failed to ack delivery {}: {}", message_id, e);
        }
    }
}

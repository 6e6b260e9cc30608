//! In-process queue and status store.
//!
//! Used when no Redis URL is configured (single instance) and by tests.
//! Both follow the same contracts as the Redis implementations, including
//! redelivery of unacknowledged jobs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_models::{JobId, JobRecord, Transition, TransitionOutcome};
use tokio::sync::{Notify, RwLock};

use crate::error::{QueueError, QueueResult, StoreError, StoreResult};
use crate::job::{Delivery, GenerateVideoJob};
use crate::queue::WorkQueue;
use crate::store::JobStatusStore;

struct InFlight {
    job: GenerateVideoJob,
    delivered_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    ready: VecDeque<(String, GenerateVideoJob)>,
    in_flight: HashMap<String, InFlight>,
    seen: HashSet<JobId>,
}

/// In-memory work queue.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries handed out but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.lock();
        let mut taken = Vec::new();
        while taken.len() < count {
            let Some((message_id, job)) = state.ready.pop_front() else {
                break;
            };
            state.in_flight.insert(
                message_id.clone(),
                InFlight {
                    job: job.clone(),
                    delivered_at: Instant::now(),
                },
            );
            taken.push(Delivery { message_id, job });
        }
        taken
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, job: &GenerateVideoJob) -> QueueResult<String> {
        let message_id = {
            let mut state = self.lock();
            if !state.seen.insert(job.job_id.clone()) {
                return Err(QueueError::Duplicate(job.job_id.clone()));
            }
            state.next_id += 1;
            let message_id = format!("{}-0", state.next_id);
            state.ready.push_back((message_id.clone(), job.clone()));
            message_id
        };
        self.notify.notify_one();
        Ok(message_id)
    }

    async fn consume(&self, _consumer: &str, block: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            let taken = self.take(count);
            if !taken.is_empty() {
                return Ok(taken);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        self.lock().in_flight.remove(message_id);
        Ok(())
    }

    async fn claim_stale(&self, _consumer: &str, min_idle: Duration, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut state = self.lock();
        let mut claimed = Vec::new();
        for (message_id, entry) in state.in_flight.iter_mut() {
            if claimed.len() >= count {
                break;
            }
            if entry.delivered_at.elapsed() >= min_idle {
                entry.delivered_at = Instant::now();
                claimed.push(Delivery {
                    message_id: message_id.clone(),
                    job: entry.job.clone(),
                });
            }
        }
        Ok(claimed)
    }

    async fn heartbeat(&self, _consumer: &str, message_id: &str) -> QueueResult<()> {
        if let Some(entry) = self.lock().in_flight.get_mut(message_id) {
            entry.delivered_at = Instant::now();
        }
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.lock();
        Ok((state.ready.len() + state.in_flight.len()) as u64)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// In-memory status store; one write lock serializes all transitions.
#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop records not updated within `max_age`. Returns how many were removed.
    pub async fn purge_stale(&self, max_age: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_stale(max_age, now));
        before - records.len()
    }
}

#[async_trait]
impl JobStatusStore for MemoryStatusStore {
    async fn create(&self, job_id: &JobId, requested_at: DateTime<Utc>) -> StoreResult<JobRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(job_id) {
            return Err(StoreError::AlreadyExists(job_id.clone()));
        }
        let record = JobRecord::new(job_id.clone(), requested_at);
        records.insert(job_id.clone(), record.clone());
        Ok(record)
    }

    async fn transition(&self, job_id: &JobId, transition: Transition) -> StoreResult<TransitionOutcome> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.clone()))?;

        // Apply to a copy so a rejected transition leaves the record untouched.
        let mut next = record.clone();
        let outcome = next.apply(&transition, Utc::now())?;
        if outcome.is_applied() {
            *record = next;
        }
        Ok(outcome)
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<JobRecord> {
        self.records
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{BackgroundCategory, BackgroundSpec, GenerationOptions, JobState, VoiceSelection};
    use std::sync::Arc;

    fn job() -> GenerateVideoJob {
        GenerateVideoJob::new(GenerationOptions::embedded(
            "story",
            VoiceSelection::edge("adam"),
            BackgroundSpec::new(BackgroundCategory::Minecraft, 1.0),
        ))
    }

    #[tokio::test]
    async fn test_get_before_create_is_not_found() {
        let store = MemoryStatusStore::new();
        let id = JobId::new();
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.set_generating(&id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryStatusStore::new();
        let id = JobId::new();
        store.create(&id, Utc::now()).await.unwrap();
        assert!(matches!(store.create(&id, Utc::now()).await, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_store_lifecycle_and_idempotence() {
        let store = MemoryStatusStore::new();
        let id = JobId::new();
        store.create(&id, Utc::now()).await.unwrap();
        store.set_generating(&id).await.unwrap();
        store.update_progress(&id, 5).await.unwrap();
        store.set_ready(&id, "/videos/x.mp4").await.unwrap();
        let first = store.get(&id).await.unwrap();

        let outcome = store.set_ready(&id, "/videos/x.mp4").await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);
        store.update_progress(&id, 40).await.unwrap();
        store.set_failed(&id, "late").await.unwrap();

        assert_eq!(store.get(&id).await.unwrap(), first);
        assert_eq!(first.state, JobState::Ready);
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_record() {
        let store = MemoryStatusStore::new();
        let id = JobId::new();
        let created = store.create(&id, Utc::now()).await.unwrap();
        assert!(matches!(
            store.set_failed(&id, "x").await,
            Err(StoreError::InvalidTransition(_))
        ));
        assert_eq!(store.get(&id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_concurrent_terminal_writes_settle_on_one() {
        let store = Arc::new(MemoryStatusStore::new());
        let id = JobId::new();
        store.create(&id, Utc::now()).await.unwrap();
        store.set_generating(&id).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.set_ready(&id, "ref").await
                } else {
                    store.set_failed(&id, "err").await
                }
            }));
        }
        let applied = futures_applied(handles).await;
        assert_eq!(applied, 1);

        let record = store.get(&id).await.unwrap();
        match record.state {
            JobState::Ready => assert!(record.error.is_none() && record.result.is_some()),
            JobState::Failed => assert!(record.result.is_none() && record.error.is_some()),
            other => panic!("unexpected state {other}"),
        }
    }

    async fn futures_applied(
        handles: Vec<tokio::task::JoinHandle<StoreResult<TransitionOutcome>>>,
    ) -> usize {
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_applied() {
                applied += 1;
            }
        }
        applied
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let store = MemoryStatusStore::new();
        let id = JobId::new();
        store.create(&id, Utc::now() - chrono::Duration::hours(30)).await.unwrap();
        store.create(&JobId::new(), Utc::now()).await.unwrap();
        assert_eq!(store.purge_stale(chrono::Duration::hours(24)).await, 1);
        tokio_test::assert_err!(store.get(&id).await);
    }

    #[tokio::test]
    async fn test_queue_delivers_and_acks() {
        let queue = MemoryQueue::new();
        let job = job();
        queue.enqueue(&job).await.unwrap();

        let deliveries = queue.consume("w1", Duration::from_millis(10), 5).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].job, job);
        assert_eq!(queue.in_flight(), 1);

        queue.ack(&deliveries[0].message_id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queue_rejects_duplicate_job_id() {
        let queue = MemoryQueue::new();
        let job = job();
        queue.enqueue(&job).await.unwrap();
        assert!(matches!(queue.enqueue(&job).await, Err(QueueError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_consume_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let deliveries = queue.consume("w1", Duration::from_millis(20), 1).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_consume_wakes_on_enqueue() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.consume("w1", Duration::from_secs(5), 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(&job()).await.unwrap();
        let deliveries = consumer.await.unwrap().unwrap();
        assert_eq!(deliveries.len(), 1);
    }

    #[tokio::test]
    async fn test_unacked_delivery_is_redelivered() {
        let queue = MemoryQueue::new();
        queue.enqueue(&job()).await.unwrap();
        let first = queue.consume("crashed", Duration::from_millis(10), 1).await.unwrap();

        let none = queue.claim_stale("w2", Duration::from_secs(60), 10).await.unwrap();
        assert!(none.is_empty());

        let claimed = queue.claim_stale("w2", Duration::ZERO, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].message_id, first[0].message_id);
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_running_delivery_unclaimable() {
        let queue = MemoryQueue::new();
        queue.enqueue(&job()).await.unwrap();
        let first = queue.consume("busy", Duration::from_millis(10), 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        queue.heartbeat("busy", &first[0].message_id).await.unwrap();

        let claimed = queue.claim_stale("w2", Duration::from_millis(50), 10).await.unwrap();
        assert!(claimed.is_empty());
    }
}

//! Redis-backed queue and status store tests.

use std::time::Duration;

use chrono::Utc;
use reel_models::{BackgroundCategory, BackgroundSpec, GenerationOptions, JobId, JobState, VoiceSelection};
use reel_queue::{
    GenerateVideoJob, JobQueue, JobStatusStore, QueueConfig, RedisStatusStore, StoreConfig, StoreError,
    WorkQueue,
};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn test_job() -> GenerateVideoJob {
    GenerateVideoJob::new(GenerationOptions::embedded(
        "A. [BREAK] B.",
        VoiceSelection::edge("adam"),
        BackgroundSpec::new(BackgroundCategory::Minecraft, 1.0),
    ))
}

async fn fresh_queue() -> JobQueue {
    let suffix = JobId::new();
    let queue = JobQueue::new(QueueConfig {
        redis_url: redis_url(),
        stream_name: format!("reel:test:jobs:{}", suffix),
        consumer_group: "reel-test".to_string(),
    })
    .expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    queue
}

fn store() -> RedisStatusStore {
    RedisStatusStore::new(StoreConfig {
        redis_url: redis_url(),
        key_prefix: "reel:test:job".to_string(),
        ttl_secs: 300,
    })
    .expect("Failed to create store")
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = fresh_queue().await;
    let job = test_job();

    queue.enqueue(&job).await.expect("Failed to enqueue");
    let deliveries = queue
        .consume("consumer-a", Duration::from_millis(500), 1)
        .await
        .expect("Failed to consume");

    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job.job_id, job.job_id);

    queue.ack(&deliveries[0].message_id).await.expect("Failed to ack");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_enqueue_rejected() {
    let queue = fresh_queue().await;
    let job = test_job();
    queue.enqueue(&job).await.unwrap();
    tokio_test::assert_err!(queue.enqueue(&job).await);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unacked_job_is_reclaimed() {
    let queue = fresh_queue().await;
    queue.enqueue(&test_job()).await.unwrap();

    let first = queue
        .consume("crashed-worker", Duration::from_millis(500), 1)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let claimed = queue
        .claim_stale("healthy-worker", Duration::from_millis(10), 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].message_id, first[0].message_id);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_heartbeat_resets_idle_time() {
    let queue = fresh_queue().await;
    queue.enqueue(&test_job()).await.unwrap();

    let first = queue
        .consume("busy-worker", Duration::from_millis(500), 1)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    queue.heartbeat("busy-worker", &first[0].message_id).await.unwrap();

    let claimed = queue
        .claim_stale("other-worker", Duration::from_millis(200), 10)
        .await
        .unwrap();
    assert!(claimed.is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_status_store_lifecycle() {
    let store = store();
    let id = JobId::new();

    assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
    store.create(&id, Utc::now()).await.unwrap();
    assert!(matches!(store.create(&id, Utc::now()).await, Err(StoreError::AlreadyExists(_))));

    store.set_generating(&id).await.unwrap();
    store.update_progress(&id, 5).await.unwrap();
    store.update_progress(&id, 95).await.unwrap();
    store.set_ready(&id, "https://cdn.example.com/videos/x.mp4").await.unwrap();
    let ready = store.get(&id).await.unwrap();
    assert_eq!(ready.state, JobState::Ready);
    assert_eq!(ready.progress, 100);

    store.set_ready(&id, "https://cdn.example.com/videos/x.mp4").await.unwrap();
    store.update_progress(&id, 10).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap(), ready);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_status_store_concurrent_writers() {
    let store = std::sync::Arc::new(store());
    let id = JobId::new();
    store.create(&id, Utc::now()).await.unwrap();
    store.set_generating(&id).await.unwrap();

    let mut handles = Vec::new();
    for percent in 1..=10u8 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { store.update_progress(&id, percent).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.get(&id).await.unwrap().progress, 10);
}

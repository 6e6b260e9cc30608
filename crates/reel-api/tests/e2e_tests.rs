//! Submit over HTTP, generate with an in-process worker, stream the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use reel_api::{create_router, ApiConfig, AppState};
use reel_media::{BackgroundLibrary, CompositionRequest, MediaResult, Renderer};
use reel_models::{ProviderKind, WordTiming};
use reel_narration::{Narration, NarrationProvider, NarrationRegistry, NarrationResult, SpeechRequest};
use reel_queue::{MemoryQueue, MemoryStatusStore};
use reel_storage::{LocalDelivery, LocalVideoStore};
use reel_worker::{ContentOrchestrator, DefaultStoryResolver, JobExecutor, WorkerConfig};

struct ScriptedNarration;

#[async_trait]
impl NarrationProvider for ScriptedNarration {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Edge
    }

    async fn synthesize(&self, request: &SpeechRequest, _cancel: &CancellationToken) -> NarrationResult<Narration> {
        let audio_path = request.output_dir.join("narration.mp3");
        tokio::fs::write(&audio_path, b"audio").await?;
        let words: Vec<WordTiming> = request
            .text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| WordTiming::new(w, i as f64 * 0.4, i as f64 * 0.4 + 0.3))
            .collect();
        let duration = words.last().map(|w| w.end).unwrap_or(1.0);
        Ok(Narration {
            audio_path,
            words,
            duration,
        })
    }
}

/// Produces a 4 KiB "video" so range requests have something to cut.
struct ByteRenderer;

#[async_trait]
impl Renderer for ByteRenderer {
    async fn render(&self, request: &CompositionRequest, _cancel: &CancellationToken) -> MediaResult<PathBuf> {
        let bytes: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
        tokio::fs::write(&request.output, bytes).await?;
        Ok(request.output.clone())
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    (status, headers, body)
}

#[tokio::test]
async fn test_submit_generate_and_stream() {
    let dir = TempDir::new().unwrap();
    let backgrounds = dir.path().join("assets/backgrounds/subway");
    tokio::fs::create_dir_all(&backgrounds).await.unwrap();
    tokio::fs::write(backgrounds.join("run.mp4"), b"bg").await.unwrap();

    let store = Arc::new(MemoryStatusStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let videos = LocalVideoStore::new(dir.path().join("videos"));
    let delivery = Arc::new(LocalDelivery::new(videos.clone()));

    let worker_config = WorkerConfig {
        work_dir: dir.path().join("work"),
        assets_dir: dir.path().join("assets"),
        consume_block: Duration::from_millis(50),
        job_timeout: Duration::from_secs(10),
        ..WorkerConfig::default()
    };
    let orchestrator = ContentOrchestrator::new(
        Arc::new(DefaultStoryResolver::new(None).unwrap()),
        NarrationRegistry::new().register(Arc::new(ScriptedNarration)),
        BackgroundLibrary::new(&worker_config.assets_dir),
        Arc::new(ByteRenderer),
    );
    let worker = Arc::new(JobExecutor::new(
        worker_config,
        queue.clone(),
        store.clone(),
        Arc::new(orchestrator),
        delivery.clone(),
    ));
    let worker_task = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    let router = create_router(
        AppState::new(ApiConfig::default(), store, queue, videos, delivery),
        None,
    );

    let submit = Request::post("/api/videos/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "story": { "kind": "embedded", "title": "The night shift", "text": "Nobody else was on the train." },
                "voice": { "provider": "edge", "voiceId": "brian" },
                "background": { "category": "subway", "speedMultiplier": 1.5 }
            })
            .to_string(),
        ))
        .unwrap();
    let (status, _, body) = send(&router, submit).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let status_url = body["statusUrl"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let final_status = loop {
        let (status, _, body) = send(&router, Request::get(&status_url).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        if body["status"] != "generating" {
            break body;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    worker.shutdown();
    worker_task.await.unwrap().unwrap();

    assert_eq!(final_status["status"], "ready");
    let video_url = final_status["videoUrl"].as_str().unwrap();
    assert!(video_url.starts_with("/videos/"));

    let request = Request::get(video_url)
        .header(header::RANGE, "bytes=0-99")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-99/4096");
    assert_eq!(body.len(), 100);
    assert_eq!(body[99], 99);
}

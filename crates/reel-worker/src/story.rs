//! Story resolution.
//!
//! Embedded stories are used as-is. Fetched stories come from an external
//! story service exposing `GET /api/stories/reddit?subreddit=...`.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::StorySource;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{GenerationError, GenerationResult};

/// Story text ready for segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStory {
    pub title: Option<String>,
    pub text: String,
    pub subreddit: Option<String>,
}

#[async_trait]
pub trait StoryResolver: Send + Sync {
    async fn resolve(&self, source: &StorySource, cancel: &CancellationToken) -> GenerationResult<ResolvedStory>;
}

#[derive(Debug, Deserialize)]
struct StoryListResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    stories: Vec<StoryItem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoryItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
}

/// Resolves embedded stories locally and fetched stories over HTTP.
#[derive(Clone)]
pub struct DefaultStoryResolver {
    http: Client,
    service_url: Option<String>,
}

impl DefaultStoryResolver {
    pub fn new(service_url: Option<String>) -> GenerationResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GenerationError::resolution(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, service_url })
    }

    async fn fetch(&self, base: &str, subreddit: &str) -> GenerationResult<ResolvedStory> {
        let url = format!("{}/api/stories/reddit", base.trim_end_matches('/'));
        debug!("Fetching story from {} for r/{}", url, subreddit);

        let response = self
            .http
            .get(&url)
            .query(&[("subreddit", subreddit)])
            .send()
            .await
            .map_err(|e| GenerationError::resolution(format!("story service unreachable: {}", e)))?;

        let status = response.status();
        let body: StoryListResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::resolution(format!("story service returned {}: {}", status, e)))?;

        if !status.is_success() || !body.success {
            return Err(GenerationError::resolution(
                body.error
                    .unwrap_or_else(|| format!("story service returned {}", status)),
            ));
        }

        let story = body
            .stories
            .into_iter()
            .find(|s| !s.content.trim().is_empty())
            .ok_or_else(|| GenerationError::resolution(format!("no stories available for r/{}", subreddit)))?;

        Ok(ResolvedStory {
            title: story.title.filter(|t| !t.trim().is_empty()),
            text: story.content,
            subreddit: Some(subreddit.to_string()),
        })
    }
}

#[async_trait]
impl StoryResolver for DefaultStoryResolver {
    async fn resolve(&self, source: &StorySource, cancel: &CancellationToken) -> GenerationResult<ResolvedStory> {
        match source {
            StorySource::Embedded { title, text, subreddit } => Ok(ResolvedStory {
                title: title.clone(),
                text: text.clone(),
                subreddit: subreddit.clone(),
            }),
            StorySource::Fetch { subreddit } => {
                let base = self
                    .service_url
                    .as_deref()
                    .ok_or_else(|| GenerationError::resolution("story fetching is not configured"))?;
                tokio::select! {
                    story = self.fetch(base, subreddit) => story,
                    _ = cancel.cancelled() => Err(GenerationError::Cancelled),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embedded_story_passes_through() {
        let resolver = DefaultStoryResolver::new(None).unwrap();
        let source = StorySource::Embedded {
            title: Some("T".into()),
            text: "A. [BREAK] B.".into(),
            subreddit: None,
        };
        let story = resolver.resolve(&source, &CancellationToken::new()).await.unwrap();
        assert_eq!(story.text, "A. [BREAK] B.");
        assert_eq!(story.title.as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn test_fetch_without_service_fails() {
        let resolver = DefaultStoryResolver::new(None).unwrap();
        let source = StorySource::Fetch { subreddit: "tifu".into() };
        let result = resolver.resolve(&source, &CancellationToken::new()).await;
        assert!(matches!(result, Err(GenerationError::ResolutionFailed(_))));
    }

    #[tokio::test]
    async fn test_fetch_picks_first_story_with_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stories/reddit"))
            .and(query_param("subreddit", "tifu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "stories": [
                    {"id": "1", "title": "empty", "content": "  "},
                    {"id": "2", "title": "TIFU by testing", "content": "It went fine."}
                ]
            })))
            .mount(&server)
            .await;

        let resolver = DefaultStoryResolver::new(Some(server.uri())).unwrap();
        let source = StorySource::Fetch { subreddit: "tifu".into() };
        let story = resolver.resolve(&source, &CancellationToken::new()).await.unwrap();

        assert_eq!(story.title.as_deref(), Some("TIFU by testing"));
        assert_eq!(story.subreddit.as_deref(), Some("tifu"));
    }

    #[tokio::test]
    async fn test_service_error_is_resolution_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "success": false,
                "error": "Reddit integration temporarily disabled"
            })))
            .mount(&server)
            .await;

        let resolver = DefaultStoryResolver::new(Some(server.uri())).unwrap();
        let source = StorySource::Fetch { subreddit: "tifu".into() };
        let result = resolver.resolve(&source, &CancellationToken::new()).await;
        assert!(matches!(result, Err(GenerationError::ResolutionFailed(msg)) if msg.contains("temporarily disabled")));
    }
}

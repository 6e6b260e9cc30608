//! Client-facing status payload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, JobState};

/// Status as seen by polling clients. Queued jobs read as generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    Generating,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: WireStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&JobRecord> for StatusResponse {
    fn from(record: &JobRecord) -> Self {
        match record.state {
            JobState::Queued | JobState::Generating => Self {
                status: WireStatus::Generating,
                progress: Some(record.progress),
                video_url: None,
                error: None,
            },
            JobState::Ready => Self {
                status: WireStatus::Ready,
                progress: Some(100),
                video_url: record.result.clone(),
                error: None,
            },
            JobState::Failed => Self {
                status: WireStatus::Failed,
                progress: None,
                video_url: None,
                error: record.error.clone(),
            },
        }
    }
}

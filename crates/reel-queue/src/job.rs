//! Queue payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use reel_models::{GenerationOptions, JobId};

/// Request to generate one video: `{jobId, options, requestedAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoJob {
    pub job_id: JobId,
    pub options: GenerationOptions,
    /// Submission time in epoch milliseconds on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub requested_at: DateTime<Utc>,
}

impl GenerateVideoJob {
    /// Create a job with a fresh id.
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            job_id: JobId::new(),
            options,
            requested_at: Utc::now(),
        }
    }

    /// Use a specific job id.
    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}", self.job_id)
    }
}

/// A job handed to one consumer, identified by its queue message id.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: String,
    pub job: GenerateVideoJob,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{BackgroundCategory, BackgroundSpec, VoiceSelection};

    #[test]
    fn test_payload_shape() {
        let options = GenerationOptions::embedded(
            "A. [BREAK] B.",
            VoiceSelection::edge("adam"),
            BackgroundSpec::new(BackgroundCategory::Minecraft, 1.0),
        );
        let job = GenerateVideoJob::new(options);
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["jobId"], job.job_id.as_str());
        assert_eq!(value["requestedAt"], job.requested_at.timestamp_millis());
        assert_eq!(value["options"]["voice"]["provider"], "edge");

        let parsed: GenerateVideoJob = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.job_id, job.job_id);
        assert_eq!(parsed.requested_at.timestamp_millis(), job.requested_at.timestamp_millis());
    }
}

//! Job identity and lifecycle.
//!
//! A job moves `Queued -> Generating -> Ready | Failed`. [`JobRecord::apply`]
//! is the single place that decides whether a write changes the record, so
//! every status store backend shares the same transition rules.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Parse a client-supplied id, accepting only UUIDs.
    ///
    /// Job ids end up in file names and storage keys, so anything that is
    /// not a plain UUID is rejected here.
    pub fn parse(s: &str) -> ModelResult<Self> {
        Uuid::parse_str(s)
            .map(|uuid| Self(uuid.to_string()))
            .map_err(|_| ModelError::InvalidJobId(s.to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted and waiting for a worker
    #[default]
    Queued,
    /// A worker is producing the video
    Generating,
    /// Finished; the artifact reference is available
    Ready,
    /// Finished with an error
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Generating => "generating",
            JobState::Ready => "ready",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "generating" => Some(JobState::Generating),
            "ready" => Some(JobState::Ready),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A requested change to a job record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Generating,
    Progress(u8),
    Ready { reference: String },
    Failed { reason: String },
}

impl Transition {
    pub fn target(&self) -> &'static str {
        match self {
            Transition::Generating => "generating",
            Transition::Progress(_) => "progress",
            Transition::Ready { .. } => "ready",
            Transition::Failed { .. } => "failed",
        }
    }
}

/// Whether a transition changed the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The write was a duplicate, late or superseded and left the record untouched.
    Ignored,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// Stored snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    pub state: JobState,
    /// 0-100, non-decreasing while generating
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a queued record with zero progress.
    pub fn new(job_id: JobId, requested_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            state: JobState::Queued,
            progress: 0,
            result: None,
            error: None,
            requested_at,
            updated_at: requested_at,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a transition at time `now`.
    ///
    /// Rules:
    /// - nothing leaves a terminal state; writes against one are ignored
    /// - `Generating` on a generating job is ignored (redelivery)
    /// - progress only moves forward and only while generating
    /// - terminal writes require the job to have started generating
    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) -> ModelResult<TransitionOutcome> {
        if self.is_terminal() {
            return Ok(TransitionOutcome::Ignored);
        }

        match transition {
            Transition::Generating => {
                if self.state == JobState::Generating {
                    return Ok(TransitionOutcome::Ignored);
                }
                self.state = JobState::Generating;
            }
            Transition::Progress(value) => {
                let next = (*value).min(100).max(self.progress);
                if self.state != JobState::Generating || next == self.progress {
                    return Ok(TransitionOutcome::Ignored);
                }
                self.progress = next;
            }
            Transition::Ready { reference } => {
                self.require_generating(transition)?;
                self.state = JobState::Ready;
                self.progress = 100;
                self.result = Some(reference.clone());
                self.error = None;
                self.completed_at = Some(now);
            }
            Transition::Failed { reason } => {
                self.require_generating(transition)?;
                self.state = JobState::Failed;
                self.error = Some(reason.clone());
                self.completed_at = Some(now);
            }
        }

        self.updated_at = now;
        Ok(TransitionOutcome::Applied)
    }

    fn require_generating(&self, transition: &Transition) -> ModelResult<()> {
        if self.state != JobState::Generating {
            return Err(ModelError::InvalidTransition {
                from: self.state,
                to: transition.target(),
            });
        }
        Ok(())
    }

    /// Whether the record has not been touched for longer than `max_age`.
    pub fn is_stale(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generating() -> JobRecord {
        let mut record = JobRecord::new(JobId::new(), Utc::now());
        record.apply(&Transition::Generating, Utc::now()).unwrap();
        record
    }

    #[test]
    fn test_job_id_parse_rejects_non_uuid() {
        assert!(JobId::parse("../etc/passwd").is_err());
        let id = JobId::new();
        assert_eq!(JobId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut record = generating();
        assert_eq!(record.state, JobState::Generating);

        record.apply(&Transition::Progress(5), Utc::now()).unwrap();
        record.apply(&Transition::Progress(95), Utc::now()).unwrap();
        assert_eq!(record.progress, 95);

        let outcome = record
            .apply(&Transition::Ready { reference: "/videos/a.mp4".into() }, Utc::now())
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(record.state, JobState::Ready);
        assert_eq!(record.progress, 100);
        assert_eq!(record.result.as_deref(), Some("/videos/a.mp4"));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut record = generating();
        record.apply(&Transition::Progress(60), Utc::now()).unwrap();
        let outcome = record.apply(&Transition::Progress(10), Utc::now()).unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);
        assert_eq!(record.progress, 60);

        record.apply(&Transition::Progress(250), Utc::now()).unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_progress_ignored_while_queued() {
        let mut record = JobRecord::new(JobId::new(), Utc::now());
        let outcome = record.apply(&Transition::Progress(40), Utc::now()).unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn test_terminal_writes_are_idempotent() {
        let mut record = generating();
        let failed = Transition::Failed { reason: "boom".into() };
        record.apply(&failed, Utc::now()).unwrap();
        let snapshot = record.clone();

        let outcome = record.apply(&failed, Utc::now()).unwrap();
        assert_eq!(outcome, TransitionOutcome::Ignored);
        assert_eq!(record, snapshot);

        // A late success from a superseded attempt does not overwrite the failure.
        record
            .apply(&Transition::Ready { reference: "x".into() }, Utc::now())
            .unwrap();
        assert_eq!(record, snapshot);
    }

    #[test]
    fn test_progress_after_terminal_is_noop() {
        let mut record = generating();
        record
            .apply(&Transition::Ready { reference: "url".into() }, Utc::now())
            .unwrap();
        let snapshot = record.clone();
        record.apply(&Transition::Progress(50), Utc::now()).unwrap();
        record.apply(&Transition::Generating, Utc::now()).unwrap();
        assert_eq!(record, snapshot);
    }

    #[test]
    fn test_terminal_write_requires_generating() {
        let mut record = JobRecord::new(JobId::new(), Utc::now());
        let err = record
            .apply(&Transition::Ready { reference: "url".into() }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidTransition { from: JobState::Queued, .. }));
        assert_eq!(record.state, JobState::Queued);
    }

    #[test]
    fn test_stale_detection() {
        let mut record = JobRecord::new(JobId::new(), Utc::now());
        record.updated_at = Utc::now() - chrono::Duration::hours(25);
        assert!(record.is_stale(chrono::Duration::hours(24), Utc::now()));
        assert!(!generating().is_stale(chrono::Duration::hours(24), Utc::now()));
    }
}

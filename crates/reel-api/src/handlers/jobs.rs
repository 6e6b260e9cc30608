//! Job submission and status polling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{error, info};

use reel_models::{GenerationOptions, JobId, StatusResponse, WireStatus};
use reel_queue::GenerateVideoJob;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: WireStatus,
    pub status_url: String,
}

pub fn status_url(job_id: &JobId) -> String {
    format!("/api/videos/{}/status", job_id)
}

/// Validate options, create the job record, enqueue.
///
/// Invalid requests are rejected before anything is created.
pub async fn submit_generation(
    State(state): State<AppState>,
    payload: Result<Json<GenerationOptions>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(options) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    options.check()?;

    let job = GenerateVideoJob::new(options);
    state.store.create(&job.job_id, job.requested_at).await?;

    if let Err(e) = state.queue.enqueue(&job).await {
        // The record stays queued and expires with the status TTL.
        error!(job_id = %job.job_id, "Failed to enqueue job: {}", e);
        return Err(e.into());
    }

    metrics::record_job_enqueued();
    info!(job_id = %job.job_id, "Job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            status_url: status_url(&job.job_id),
            job_id: job.job_id,
            status: WireStatus::Generating,
        }),
    ))
}

/// Current status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let job_id = JobId::parse(&job_id)?;
    let record = state.store.get(&job_id).await?;
    Ok(Json(StatusResponse::from(&record)))
}

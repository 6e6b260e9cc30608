//! Local video streaming with byte ranges.

use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use reel_storage::{ByteRange, VIDEO_CONTENT_TYPE};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /videos/:filename`.
///
/// 200 with the whole file, or 206 for a satisfiable `Range`. Unknown files
/// are 404, unsatisfiable ranges 416.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let (mut file, total) = state.videos.open(&filename).await?;

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, VIDEO_CONTENT_TYPE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .header("Cross-Origin-Resource-Policy", "cross-origin");

    let response = match range_header {
        Some(value) => {
            let range = ByteRange::parse(value, total)?;
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| ApiError::internal(format!("Failed to seek video: {}", e)))?;
            let body = Body::from_stream(ReaderStream::new(file.take(range.len())));

            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, range.content_range())
                .header(header::CONTENT_LENGTH, range.len())
                .body(body)
        }
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total)
            .body(Body::from_stream(ReaderStream::new(file))),
    };

    response.map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, Response, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;
use tgrelay_core::AppError;
use tgrelay_transfer::ChannelSink;

/// Chunks buffered between the reassembly task and the response body.
const BODY_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file_id: Option<String>,
}

/// Header value for `attachment; filename="..."`.
///
/// Quotes, backslashes and control characters cannot appear inside the quoted
/// name; everything else, UTF-8 included, is passed through as raw bytes.
fn content_disposition(filename: &str) -> Result<HeaderValue, AppError> {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    HeaderValue::from_bytes(format!("attachment; filename=\"{}\"", safe).as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid Content-Disposition: {}", e)))
}

/// Stream the file described by the manifest `file_id`.
///
/// Manifest errors are reported as ordinary error responses. Once the
/// response has started, a failed chunk aborts the body instead, so the
/// client sees a broken transfer rather than a short file.
#[tracing::instrument(skip(state))]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response<Body>, HttpAppError> {
    let file_id = query
        .file_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing file_id parameter".to_string()))?;

    let manifest = state.reassembler.open_manifest(&file_id).await?;
    let disposition = content_disposition(manifest.original_filename())?;

    tracing::info!(
        file_id = %file_id,
        filename = %manifest.original_filename(),
        chunk_count = manifest.chunk_count(),
        "Starting download"
    );

    let (mut sink, body) = ChannelSink::channel(BODY_CHANNEL_CAPACITY);
    let reassembler = state.reassembler.clone();

    tokio::spawn(async move {
        if let Err(e) = reassembler.stream_to(&manifest, &mut sink).await {
            tracing::error!(
                file_id = %file_id,
                error = %e,
                "Download aborted after response started"
            );
            sink.abort(std::io::Error::other(e.to_string())).await;
        }
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

//! Upload handlers
//!
//! Two flows produce the same result. The browser uploader splits files
//! itself, posts each piece to `/upload_chunk` and then lists the returned ids
//! in `/merge_chunks`. Plain clients post the whole file to `/upload` and the
//! server splits it.

use crate::auth::check_password;
use crate::error::HttpAppError;
use crate::state::AppState;
use crate::utils::form::FormFields;
use crate::utils::url::download_url;
use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tgrelay_core::AppError;
use tokio_util::io::StreamReader;

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub filename: String,
    pub file_id: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct ChunkUploadResponse {
    pub file_id: String,
}

/// Whole-file upload, split into chunks while the body streams in.
///
/// The `pwd` field must come before `file`: the file is stored as it is read,
/// so it cannot wait for a password sent after it.
#[tracing::instrument(skip_all)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResult>, HttpAppError> {
    let mut authorized = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("pwd") => {
                let pwd = field.text().await?;
                check_password(state.config.access_password(), Some(&pwd))?;
                authorized = true;
            }
            Some("file") => {
                if !authorized {
                    return Err(AppError::Unauthorized(
                        "Send pwd before the file field".to_string(),
                    )
                    .into());
                }

                let filename = field
                    .file_name()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .unwrap_or("unknown")
                    .to_string();

                let body = field.map(|piece| piece.map_err(std::io::Error::other));
                let reader = StreamReader::new(Box::pin(body));
                let uploaded = state.uploader.upload_file(&filename, reader).await?;

                let download_url = download_url(&state.config, &headers, &uploaded.manifest_id);
                return Ok(Json(UploadResult {
                    filename: uploaded.filename,
                    file_id: uploaded.manifest_id,
                    download_url,
                }));
            }
            _ => {}
        }
    }

    if !authorized {
        return Err(AppError::Unauthorized("Wrong password".to_string()).into());
    }
    Err(AppError::InvalidInput("No file provided".to_string()).into())
}

/// Store one piece of a file split by the client.
#[tracing::instrument(skip_all)]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    mut form: FormFields,
) -> Result<Json<ChunkUploadResponse>, HttpAppError> {
    check_password(state.config.access_password(), form.text("pwd"))?;

    let filename = form.require_text("filename")?.to_string();
    let chunk_index = form.require_usize("chunk_index")?;
    let total_chunks = form.require_usize("total_chunks")?;
    if total_chunks == 0 || chunk_index > total_chunks {
        return Err(AppError::InvalidInput(format!(
            "chunk_index {} is out of range for {} chunks",
            chunk_index, total_chunks
        ))
        .into());
    }

    let chunk = form
        .take_bytes("chunk")
        .filter(|chunk| !chunk.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing chunk data".to_string()))?;

    let file_id = state
        .uploader
        .upload_piece(&filename, chunk_index, total_chunks, chunk)
        .await?;

    Ok(Json(ChunkUploadResponse { file_id }))
}

/// Store the manifest for previously uploaded chunks.
#[tracing::instrument(skip_all)]
pub async fn merge_chunks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: FormFields,
) -> Result<Json<UploadResult>, HttpAppError> {
    check_password(state.config.access_password(), form.text("pwd"))?;

    let filename = form.require_text("filename")?.to_string();
    let chunk_ids: Vec<String> = serde_json::from_str(form.require_text("chunk_ids")?)?;
    if chunk_ids.is_empty() {
        return Err(AppError::InvalidInput("chunk_ids must not be empty".to_string()).into());
    }

    let file_id = state.uploader.finalize(&filename, chunk_ids).await?;
    let download_url = download_url(&state.config, &headers, &file_id);

    Ok(Json(UploadResult {
        filename,
        file_id,
        download_url,
    }))
}

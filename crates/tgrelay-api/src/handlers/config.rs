use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// Transfer settings advertised to the browser uploader
#[derive(Debug, Serialize)]
pub struct ClientConfigResponse {
    pub chunk_size_mb: usize,
    pub chunk_concurrent: usize,
    pub files_concurrent: usize,
    pub download_threads: usize,
}

pub async fn client_config(State(state): State<Arc<AppState>>) -> Json<ClientConfigResponse> {
    let transfer = state.config.transfer();
    Json(ClientConfigResponse {
        chunk_size_mb: transfer.chunk_size_mb(),
        chunk_concurrent: transfer.upload_concurrency,
        files_concurrent: transfer.files_concurrency,
        download_threads: transfer.download_concurrency,
    })
}

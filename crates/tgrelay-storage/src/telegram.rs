//! Telegram Bot API blob store
//!
//! Blobs are documents posted to one chat. `put` uses `sendDocument` and
//! returns the document `file_id`; `fetch` resolves a `file_id` through
//! `getFile` and streams the file from the Bot API file endpoint.
//!
//! The bot token is part of every request URL, so transport errors are
//! stripped of their URL before they are logged or returned.

use crate::traits::{BlobStore, ByteStream, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tgrelay_core::TelegramConfig;

/// Largest file the Bot API lets a bot download.
pub const BOT_API_DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const API_CALL_TIMEOUT_SECS: u64 = 60;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgAttachment {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    document: Option<TgAttachment>,
    video: Option<TgAttachment>,
    audio: Option<TgAttachment>,
}

impl TgMessage {
    fn file_id(self) -> Option<String> {
        self.document
            .or(self.video)
            .or(self.audio)
            .map(|attachment| attachment.file_id)
    }
}

/// Blob store backed by a Telegram chat
#[derive(Clone)]
pub struct TelegramStore {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: i64,
}

impl TelegramStore {
    pub fn new(config: &TelegramConfig) -> StorageResult<Self> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| StorageError::ConfigError(format!("Invalid PROXY: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.bot_token, file_path)
    }

    /// Resolve a file id to its transient download path.
    async fn get_file(&self, blob_id: &str) -> StorageResult<TgFile> {
        let response = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", blob_id)])
            .timeout(Duration::from_secs(API_CALL_TIMEOUT_SECS))
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ApiResponse<TgFile> = response.json().await.map_err(transport_error)?;
        let file = unwrap_envelope(envelope, blob_id)?;

        if let Some(size) = file.file_size {
            if size > BOT_API_DOWNLOAD_LIMIT {
                return Err(StorageError::TooLarge {
                    blob_id: blob_id.to_string(),
                    size,
                    limit: BOT_API_DOWNLOAD_LIMIT,
                });
            }
        }

        Ok(file)
    }
}

/// Map a reqwest error to a storage error without leaking the request URL.
fn transport_error(err: reqwest::Error) -> StorageError {
    StorageError::Transient(err.without_url().to_string())
}

/// Unwrap a Bot API envelope, classifying failures.
fn unwrap_envelope<T>(envelope: ApiResponse<T>, blob_id: &str) -> StorageResult<T> {
    match (envelope.ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(StorageError::Transient(
            "Bot API returned ok without a result".to_string(),
        )),
        (false, _) => Err(classify_api_error(
            envelope.error_code,
            envelope.description.as_deref().unwrap_or_default(),
            blob_id,
        )),
    }
}

/// Classify a Bot API error description.
///
/// `TooLarge` must stay distinct from other failures: it is the one error a
/// client can fix by re-uploading the file in chunks.
fn classify_api_error(error_code: Option<u16>, description: &str, blob_id: &str) -> StorageError {
    let lower = description.to_lowercase();

    if lower.contains("file is too big") || lower.contains("request entity too large") {
        return StorageError::TooLarge {
            blob_id: blob_id.to_string(),
            size: 0,
            limit: BOT_API_DOWNLOAD_LIMIT,
        };
    }

    if error_code == Some(404)
        || (error_code == Some(400)
            && (lower.contains("invalid file_id")
                || lower.contains("wrong file_id")
                || lower.contains("file not found")))
    {
        return StorageError::NotFound(blob_id.to_string());
    }

    StorageError::Transient(format!(
        "Bot API error {}: {}",
        error_code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
        description
    ))
}

#[async_trait]
impl BlobStore for TelegramStore {
    async fn fetch(&self, blob_id: &str) -> StorageResult<ByteStream> {
        let start = std::time::Instant::now();
        let file = self.get_file(blob_id).await?;

        let file_path = file.file_path.ok_or_else(|| {
            StorageError::Transient(format!("getFile returned no file_path for {}", blob_id))
        })?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound(blob_id.to_string())),
            StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(StorageError::TooLarge {
                    blob_id: blob_id.to_string(),
                    size: file.file_size.unwrap_or(0),
                    limit: BOT_API_DOWNLOAD_LIMIT,
                })
            }
            status => {
                return Err(StorageError::Transient(format!(
                    "File download for {} returned status {}",
                    blob_id, status
                )))
            }
        }

        tracing::debug!(
            blob_id = %blob_id,
            size_bytes = file.file_size,
            resolve_ms = start.elapsed().as_millis() as u64,
            "Telegram blob resolved"
        );

        let stream = response
            .bytes_stream()
            .map(|piece| piece.map_err(transport_error));

        Ok(Box::pin(stream))
    }

    async fn put(&self, filename: &str, caption: &str, data: Bytes) -> StorageResult<String> {
        let size = data.len();
        let start = std::time::Instant::now();

        let part = multipart::Part::stream_with_length(data, size as u64)
            .file_name(filename.to_string());
        let form = multipart::Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.without_url().to_string()))?;

        let envelope: ApiResponse<TgMessage> = response
            .json()
            .await
            .map_err(|e| StorageError::UploadFailed(e.without_url().to_string()))?;

        let message = match unwrap_envelope(envelope, filename) {
            Ok(message) => message,
            Err(StorageError::TooLarge { .. }) => {
                return Err(StorageError::TooLarge {
                    blob_id: filename.to_string(),
                    size: size as u64,
                    limit: BOT_API_DOWNLOAD_LIMIT,
                })
            }
            Err(e) => return Err(StorageError::UploadFailed(e.to_string())),
        };

        let file_id = message.file_id().ok_or_else(|| {
            StorageError::UploadFailed("sendDocument response carries no attachment".to_string())
        })?;

        tracing::info!(
            filename = %filename,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Telegram upload successful"
        );

        Ok(file_id)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Telegram
    }
}

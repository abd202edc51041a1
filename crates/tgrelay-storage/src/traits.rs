//! Blob storage abstraction trait
//!
//! This module defines the BlobStore trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
///
/// `NotFound`, `TooLarge` and `Transient` are the fetch outcomes callers act on;
/// the remaining variants cover configuration and local I/O.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob too large: {blob_id} ({size} bytes, limit {limit} bytes)")]
    TooLarge {
        blob_id: String,
        size: u64,
        limit: u64,
    },

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid blob id: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_) | StorageError::IoError(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Byte stream of one blob, yielded in transport-sized pieces
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Blob storage abstraction
///
/// `fetch` is the read side used for chunks and manifests alike; `put` is its
/// write-side counterpart used by the upload path. Backends do not retry
/// internally unless documented.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Resolve a blob identifier and return its bytes as a stream.
    async fn fetch(&self, blob_id: &str) -> StorageResult<ByteStream>;

    /// Store a blob and return its identifier.
    ///
    /// `filename` is the attachment name shown by the service and `caption`
    /// a human-readable label. Storing the same bytes twice yields two blobs.
    async fn put(&self, filename: &str, caption: &str, data: Bytes) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Drain a blob stream into one contiguous buffer, failing with `TooLarge`
/// as soon as more than `limit` bytes have been received.
pub async fn collect_blob(blob_id: &str, mut stream: ByteStream, limit: usize) -> StorageResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(piece) = stream.next().await {
        let piece = piece?;
        if buf.len() + piece.len() > limit {
            return Err(StorageError::TooLarge {
                blob_id: blob_id.to_string(),
                size: (buf.len() + piece.len()) as u64,
                limit: limit as u64,
            });
        }
        buf.extend_from_slice(&piece);
    }
    Ok(buf.freeze())
}

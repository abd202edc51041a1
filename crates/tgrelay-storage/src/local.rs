use crate::traits::{BlobStore, ByteStream, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem blob store
///
/// Each blob is one file named after its identifier. Used for development and
/// tests, and as a drop-in when no bot credentials are available.
#[derive(Clone)]
pub struct LocalStore {
    base_path: PathBuf,
    max_blob_bytes: Option<u64>,
}

impl LocalStore {
    /// Create a new LocalStore instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for blob storage (e.g., "/var/lib/tgrelay/blobs")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStore {
            base_path,
            max_blob_bytes: None,
        })
    }

    /// Refuse to fetch blobs larger than `limit`, like the Bot API download limit.
    pub fn with_max_blob_bytes(mut self, limit: u64) -> Self {
        self.max_blob_bytes = Some(limit);
        self
    }

    /// Convert a blob id to a filesystem path.
    ///
    /// Ids are generated by this store, so anything that is not a plain
    /// file name is rejected rather than resolved.
    fn id_to_path(&self, blob_id: &str) -> StorageResult<PathBuf> {
        if blob_id.is_empty()
            || blob_id.contains("..")
            || blob_id.contains('/')
            || blob_id.contains('\\')
        {
            return Err(StorageError::InvalidKey(
                "Blob id contains invalid characters".to_string(),
            ));
        }

        Ok(self.base_path.join(blob_id))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn fetch(&self, blob_id: &str) -> StorageResult<ByteStream> {
        let path = self.id_to_path(blob_id)?;
        let start = std::time::Instant::now();

        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(blob_id.to_string()));
            }
            Err(e) => return Err(StorageError::IoError(e)),
        };

        if let Some(limit) = self.max_blob_bytes {
            if meta.len() > limit {
                return Err(StorageError::TooLarge {
                    blob_id: blob_id.to_string(),
                    size: meta.len(),
                    limit,
                });
            }
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::Transient(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let reader = tokio_util::io::ReaderStream::new(file);

        let id = blob_id.to_string();
        let stream = reader.map(move |result| {
            result.map_err(|e| {
                tracing::error!(
                    blob_id = %id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream read error"
                );
                StorageError::Transient(format!("Failed to read blob: {}", e))
            })
        });

        tracing::debug!(blob_id = %blob_id, size_bytes = meta.len(), "Local storage fetch started");

        Ok(Box::pin(stream))
    }

    async fn put(&self, filename: &str, caption: &str, data: Bytes) -> StorageResult<String> {
        let blob_id = Uuid::new_v4().simple().to_string();
        let path = self.id_to_path(&blob_id)?;
        let size = data.len();
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            blob_id = %blob_id,
            filename = %filename,
            caption = %caption,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(blob_id)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

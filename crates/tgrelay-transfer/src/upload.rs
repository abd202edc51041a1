//! Upload path
//!
//! Files arrive either as pre-split pieces (the browser uploader) or as one
//! stream split here. Either way every piece becomes its own blob and a
//! manifest listing the piece ids in order is stored last.

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use std::io;
use std::pin::pin;
use std::sync::Arc;
use tgrelay_core::{FormatError, Manifest, ManifestBuilder, TransferConfig, MANIFEST_FILENAME};
use tgrelay_storage::{BlobStore, StorageError, StorageResult};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to read upload body: {0}")]
    Read(#[from] io::Error),

    #[error("Uploaded file is empty")]
    Empty,
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub manifest_id: String,
    pub chunk_count: usize,
    pub size_bytes: u64,
}

fn piece_caption(filename: &str, index: usize, total: Option<usize>) -> String {
    match total {
        Some(total) => format!("blob [{}/{}] - {}", index, total, filename),
        None => format!("blob [{}] - {}", index, filename),
    }
}

/// Read up to `size` bytes; `None` at end of input.
async fn read_piece<R: AsyncRead + Unpin>(reader: &mut R, size: usize) -> io::Result<Option<Bytes>> {
    let mut buf = Vec::with_capacity(size);
    (&mut *reader).take(size as u64).read_to_end(&mut buf).await?;
    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Bytes::from(buf)))
    }
}

/// Stores file pieces and their manifests.
#[derive(Clone)]
pub struct ChunkUploader {
    store: Arc<dyn BlobStore>,
    chunk_size: usize,
    max_chunk_bytes: usize,
    concurrency: usize,
}

impl ChunkUploader {
    pub fn new(store: Arc<dyn BlobStore>, config: &TransferConfig) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size_bytes.max(1),
            max_chunk_bytes: config.max_chunk_bytes,
            concurrency: config.upload_concurrency.max(1),
        }
    }

    /// Store one pre-split piece and return its identifier.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn upload_piece(
        &self,
        filename: &str,
        index: usize,
        total: usize,
        data: Bytes,
    ) -> StorageResult<String> {
        self.put_piece(filename, &piece_caption(filename, index, Some(total)), data)
            .await
    }

    async fn put_piece(&self, filename: &str, caption: &str, data: Bytes) -> StorageResult<String> {
        if data.len() > self.max_chunk_bytes {
            return Err(StorageError::TooLarge {
                blob_id: filename.to_string(),
                size: data.len() as u64,
                limit: self.max_chunk_bytes as u64,
            });
        }
        self.store.put(filename, caption, data).await
    }

    /// Store the manifest for `chunk_ids` and return its identifier.
    #[tracing::instrument(skip(self, chunk_ids), fields(chunk_count = chunk_ids.len()))]
    pub async fn finalize(&self, filename: &str, chunk_ids: Vec<String>) -> Result<String, UploadError> {
        let manifest = Manifest::new(filename, chunk_ids)?;
        self.store_manifest(&manifest).await
    }

    async fn store_manifest(&self, manifest: &Manifest) -> Result<String, UploadError> {
        let manifest_id = self
            .store
            .put(
                MANIFEST_FILENAME,
                manifest.original_filename(),
                Bytes::from(manifest.encode()),
            )
            .await?;

        tracing::info!(
            manifest_id = %manifest_id,
            filename = %manifest.original_filename(),
            chunk_count = manifest.chunk_count(),
            "Manifest stored"
        );
        Ok(manifest_id)
    }

    /// Split `reader` into pieces, upload them and store the manifest.
    ///
    /// Pieces upload concurrently but their ids are recorded in read order.
    /// The first failure abandons the remaining pieces; blobs already stored
    /// stay behind unreferenced.
    #[tracing::instrument(skip(self, reader))]
    pub async fn upload_file<R>(&self, filename: &str, reader: R) -> Result<UploadedFile, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Manifest::check_filename(filename)?;

        let start = std::time::Instant::now();
        let chunk_size = self.chunk_size;

        let pieces = stream::try_unfold(reader, move |mut reader| async move {
            let piece = read_piece(&mut reader, chunk_size).await?;
            Ok::<_, io::Error>(piece.map(|piece| (piece, reader)))
        });

        let mut uploads = pin!(pieces
            .map_err(UploadError::from)
            .enumerate()
            .map(|(index, piece)| async move {
                let piece = piece?;
                let size = piece.len() as u64;
                let id = self
                    .put_piece(filename, &piece_caption(filename, index, None), piece)
                    .await?;
                tracing::debug!(chunk_index = index, size_bytes = size, "Piece uploaded");
                Ok::<_, UploadError>((id, size))
            })
            .buffered(self.concurrency));

        let mut builder = ManifestBuilder::new(filename);
        let mut size_bytes = 0u64;
        while let Some((id, size)) = uploads.try_next().await? {
            builder.push(id);
            size_bytes += size;
        }

        if builder.is_empty() {
            return Err(UploadError::Empty);
        }

        let chunk_count = builder.len();
        let manifest = builder.build()?;
        let manifest_id = self.store_manifest(&manifest).await?;

        tracing::info!(
            chunk_count,
            size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File upload complete"
        );

        Ok(UploadedFile {
            filename: filename.to_string(),
            manifest_id,
            chunk_count,
            size_bytes,
        })
    }
}

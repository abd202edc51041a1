use std::sync::Arc;
use tgrelay_core::{Manifest, TransferConfig};
use tgrelay_storage::{collect_blob, BlobStore};

use crate::scheduler::FetchScheduler;
use crate::writer::{ChunkSink, ReassemblyError, ReassemblyStats, ReassemblyWriter};

/// Turns a manifest identifier back into the original byte stream.
#[derive(Clone)]
pub struct Reassembler {
    store: Arc<dyn BlobStore>,
    scheduler: FetchScheduler,
    max_manifest_bytes: usize,
}

impl Reassembler {
    pub fn new(store: Arc<dyn BlobStore>, config: &TransferConfig) -> Self {
        Self {
            scheduler: FetchScheduler::new(store.clone(), config),
            store,
            max_manifest_bytes: config.max_chunk_bytes,
        }
    }

    /// Fetch and decode the manifest stored under `manifest_id`.
    #[tracing::instrument(skip(self))]
    pub async fn open_manifest(&self, manifest_id: &str) -> Result<Manifest, ReassemblyError> {
        let stream = self
            .store
            .fetch(manifest_id)
            .await
            .map_err(ReassemblyError::Manifest)?;
        let bytes = collect_blob(manifest_id, stream, self.max_manifest_bytes)
            .await
            .map_err(ReassemblyError::Manifest)?;

        let manifest = Manifest::decode(&bytes)?;
        tracing::debug!(
            filename = %manifest.original_filename(),
            chunk_count = manifest.chunk_count(),
            "Manifest decoded"
        );
        Ok(manifest)
    }

    /// Fetch every chunk of `manifest` and write them to `sink` in order.
    #[tracing::instrument(
        skip(self, manifest, sink),
        fields(
            filename = %manifest.original_filename(),
            chunk_count = manifest.chunk_count(),
            download_concurrency = self.scheduler.concurrency()
        )
    )]
    pub async fn stream_to<S: ChunkSink>(
        &self,
        manifest: &Manifest,
        sink: S,
    ) -> Result<ReassemblyStats, ReassemblyError> {
        let start = std::time::Instant::now();
        let fetches = self.scheduler.schedule(manifest.chunk_ids().to_vec());
        let writer = ReassemblyWriter::new(sink, fetches.total());

        match writer.run(fetches).await {
            Ok(stats) => {
                tracing::info!(
                    bytes_written = stats.bytes_written,
                    max_pending = stats.max_pending,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Reassembly complete"
                );
                Ok(stats)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reassembly aborted");
                Err(e)
            }
        }
    }

    /// Open the manifest and stream the file it describes.
    pub async fn reassemble<S: ChunkSink>(
        &self,
        manifest_id: &str,
        sink: S,
    ) -> Result<(Manifest, ReassemblyStats), ReassemblyError> {
        let manifest = self.open_manifest(manifest_id).await?;
        let stats = self.stream_to(&manifest, sink).await?;
        Ok((manifest, stats))
    }
}

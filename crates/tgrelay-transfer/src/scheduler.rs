//! Bounded concurrent chunk fetching
//!
//! A dispatcher task admits fetches in index order through a semaphore of `C`
//! permits. Each admitted fetch runs as its own task and keeps its permit until
//! its result sits in the delivery queue, so at most `C` fetches are in flight
//! and at most `2 * C` results exist outside the consumer at any time.

use bytes::Bytes;
use std::sync::Arc;
use tgrelay_core::TransferConfig;
use tgrelay_storage::{collect_blob, BlobStore, StorageResult};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Outcome of fetching the chunk at `index`.
#[derive(Debug)]
pub struct FetchResult {
    pub index: usize,
    pub outcome: StorageResult<Bytes>,
}

/// Issues chunk fetches against a blob store with a fixed concurrency ceiling.
#[derive(Clone)]
pub struct FetchScheduler {
    store: Arc<dyn BlobStore>,
    concurrency: usize,
    max_chunk_bytes: usize,
}

impl FetchScheduler {
    pub fn new(store: Arc<dyn BlobStore>, config: &TransferConfig) -> Self {
        Self {
            store,
            concurrency: config.download_concurrency.max(1),
            max_chunk_bytes: config.max_chunk_bytes,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start fetching `chunk_ids`; results arrive in completion order.
    ///
    /// Each id is fetched exactly once. Failures are delivered like successes
    /// and the caller decides what to do with them. Must be called from within
    /// a tokio runtime.
    pub fn schedule(&self, chunk_ids: Vec<String>) -> ScheduledFetches {
        let total = chunk_ids.len();
        let (tx, rx) = mpsc::channel(self.concurrency);
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        tokio::spawn(dispatch(
            self.store.clone(),
            chunk_ids,
            semaphore,
            tx,
            cancel.clone(),
            self.max_chunk_bytes,
        ));

        ScheduledFetches {
            receiver: rx,
            total,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

/// Receiving end of one scheduled batch.
///
/// Dropping it cancels the batch: no further fetches are admitted and
/// in-flight fetches stop at their next suspension point.
pub struct ScheduledFetches {
    receiver: mpsc::Receiver<FetchResult>,
    total: usize,
    _cancel_on_drop: DropGuard,
}

impl ScheduledFetches {
    /// Next completed fetch, or `None` once every fetch task has finished.
    pub async fn next(&mut self) -> Option<FetchResult> {
        self.receiver.recv().await
    }

    /// Number of chunks in the batch
    pub fn total(&self) -> usize {
        self.total
    }
}

async fn dispatch(
    store: Arc<dyn BlobStore>,
    chunk_ids: Vec<String>,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<FetchResult>,
    cancel: CancellationToken,
    max_chunk_bytes: usize,
) {
    for (index, blob_id) in chunk_ids.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        tokio::spawn(fetch_task(
            store.clone(),
            index,
            blob_id,
            permit,
            tx.clone(),
            cancel.clone(),
            max_chunk_bytes,
        ));
    }

    if cancel.is_cancelled() {
        tracing::debug!("Chunk dispatch cancelled");
    }
}

async fn fetch_task(
    store: Arc<dyn BlobStore>,
    index: usize,
    blob_id: String,
    permit: OwnedSemaphorePermit,
    tx: mpsc::Sender<FetchResult>,
    cancel: CancellationToken,
    max_chunk_bytes: usize,
) {
    // Held until the result is queued.
    let _permit = permit;
    let start = std::time::Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        outcome = fetch_chunk(store.as_ref(), &blob_id, max_chunk_bytes) => outcome,
    };

    match &outcome {
        Ok(bytes) => tracing::debug!(
            chunk_index = index,
            blob_id = %blob_id,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Chunk fetched"
        ),
        Err(e) => tracing::warn!(
            chunk_index = index,
            blob_id = %blob_id,
            error = %e,
            "Chunk fetch failed"
        ),
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        // A closed receiver means the consumer is gone; the result is dropped.
        _ = tx.send(FetchResult { index, outcome }) => {}
    }
}

async fn fetch_chunk(store: &dyn BlobStore, blob_id: &str, limit: usize) -> StorageResult<Bytes> {
    let stream = store.fetch(blob_id).await?;
    collect_blob(blob_id, stream, limit).await
}

//! Ordered reassembly
//!
//! Chunks arrive in completion order and leave in index order. A chunk that
//! arrives ahead of the cursor waits in the holding area until every chunk
//! before it has been written.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tgrelay_storage::StorageError;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::scheduler::{FetchResult, ScheduledFetches};

/// Destination of reassembled bytes.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        (**self).write_chunk(chunk).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        (**self).flush().await
    }
}

/// Sink over any tokio writer (files, sockets, in-memory buffers).
pub struct WriterSink<W> {
    inner: W,
}

impl<W> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for WriterSink<W> {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.inner.write_all(&chunk).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

/// Sink feeding a streaming HTTP response body.
///
/// The paired [`BodyStream`] ends cleanly only when the sink is dropped
/// without [`ChannelSink::abort`], so a failed transfer is never mistaken for
/// a complete file on the client side.
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (ChannelSink, BodyStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChannelSink { tx }, BodyStream { rx })
    }

    /// Terminate the body with an error.
    pub async fn abort(self, err: io::Error) {
        // Receiver gone means the client already disconnected.
        let _ = self.tx.send(Err(err)).await;
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.tx.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client disconnected",
            ));
        }
        Ok(())
    }
}

/// Receiving half of a [`ChannelSink`], usable as an HTTP body stream.
pub struct BodyStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error("Failed to fetch manifest: {0}")]
    Manifest(#[source] StorageError),

    #[error(transparent)]
    Format(#[from] tgrelay_core::FormatError),

    #[error("Failed to fetch chunk {index}: {source}")]
    Fetch {
        index: usize,
        #[source]
        source: StorageError,
    },

    #[error("Output write failed: {0}")]
    Sink(#[source] io::Error),

    #[error("Transfer ended after {written} of {total} chunks")]
    Incomplete { written: usize, total: usize },

    #[error("Unexpected chunk index {index}")]
    UnexpectedChunk { index: usize },
}

impl ReassemblyError {
    /// Storage error behind a failed manifest or chunk fetch
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            ReassemblyError::Manifest(source) | ReassemblyError::Fetch { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub chunks_written: usize,
    pub bytes_written: u64,
    /// Largest number of chunks held at once waiting for a predecessor
    pub max_pending: usize,
}

/// Writes chunks to a sink strictly in index order.
pub struct ReassemblyWriter<S> {
    sink: S,
    total: usize,
    next_index: usize,
    pending: BTreeMap<usize, Bytes>,
    stats: ReassemblyStats,
}

impl<S: ChunkSink> ReassemblyWriter<S> {
    pub fn new(sink: S, total: usize) -> Self {
        Self {
            sink,
            total,
            next_index: 0,
            pending: BTreeMap::new(),
            stats: ReassemblyStats::default(),
        }
    }

    /// Index of the next chunk to be written
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.next_index == self.total
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Accept the chunk at `index`, writing it and any chunks it unblocks.
    pub async fn accept(&mut self, index: usize, chunk: Bytes) -> Result<(), ReassemblyError> {
        if index >= self.total || index < self.next_index || self.pending.contains_key(&index) {
            return Err(ReassemblyError::UnexpectedChunk { index });
        }

        if index != self.next_index {
            self.pending.insert(index, chunk);
            self.stats.max_pending = self.stats.max_pending.max(self.pending.len());
            return Ok(());
        }

        self.write(chunk).await?;
        while let Some(chunk) = self.pending.remove(&self.next_index) {
            self.write(chunk).await?;
        }
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), ReassemblyError> {
        let len = chunk.len();
        self.sink
            .write_chunk(chunk)
            .await
            .map_err(ReassemblyError::Sink)?;
        self.sink.flush().await.map_err(ReassemblyError::Sink)?;

        tracing::debug!(chunk_index = self.next_index, size_bytes = len, "Chunk written");

        self.next_index += 1;
        self.stats.chunks_written += 1;
        self.stats.bytes_written += len as u64;
        Ok(())
    }

    /// Drain `fetches` until every chunk is written or one fails.
    ///
    /// The first failed fetch aborts the run; nothing after the gap is
    /// written. Returning drops `fetches`, cancelling outstanding work.
    pub async fn run(mut self, mut fetches: ScheduledFetches) -> Result<ReassemblyStats, ReassemblyError> {
        while !self.is_complete() {
            let Some(FetchResult { index, outcome }) = fetches.next().await else {
                return Err(ReassemblyError::Incomplete {
                    written: self.next_index,
                    total: self.total,
                });
            };

            match outcome {
                Ok(chunk) => self.accept(index, chunk).await?,
                Err(source) => return Err(ReassemblyError::Fetch { index, source }),
            }
        }

        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunk(i: usize) -> Bytes {
        Bytes::from(format!("[{}]", i))
    }

    fn expected(n: usize) -> Vec<u8> {
        (0..n).flat_map(|i| format!("[{}]", i).into_bytes()).collect()
    }

    async fn reassemble(order: &[usize]) -> (Vec<u8>, ReassemblyStats) {
        let mut writer = ReassemblyWriter::new(WriterSink::new(Vec::new()), order.len());
        for &i in order {
            writer.accept(i, chunk(i)).await.unwrap();
        }
        assert!(writer.is_complete());
        let stats = writer.stats();
        (writer.sink.into_inner(), stats)
    }

    #[tokio::test]
    async fn test_in_order_arrival() {
        let (out, stats) = reassemble(&[0, 1, 2, 3]).await;
        assert_eq!(out, expected(4));
        assert_eq!(stats.max_pending, 0);
        assert_eq!(stats.chunks_written, 4);
    }

    #[tokio::test]
    async fn test_any_completion_order_yields_same_bytes() {
        let orders: [&[usize]; 5] = [
            &[4, 3, 2, 1, 0],
            &[1, 0, 3, 2, 4],
            &[2, 4, 0, 3, 1],
            &[0, 4, 1, 3, 2],
            &[3, 1, 4, 0, 2],
        ];
        for order in orders {
            let (out, stats) = reassemble(order).await;
            assert_eq!(out, expected(5), "order {:?}", order);
            assert_eq!(stats.bytes_written, expected(5).len() as u64);
        }
    }

    #[tokio::test]
    async fn test_holding_area_high_water_mark() {
        let (_, stats) = reassemble(&[4, 3, 2, 1, 0]).await;
        assert_eq!(stats.max_pending, 4);
    }

    #[tokio::test]
    async fn test_writes_as_soon_as_prefix_is_contiguous() {
        let mut writer = ReassemblyWriter::new(WriterSink::new(Vec::new()), 3);
        writer.accept(1, chunk(1)).await.unwrap();
        assert_eq!(writer.next_index(), 0);
        assert_eq!(writer.pending(), 1);

        writer.accept(0, chunk(0)).await.unwrap();
        assert_eq!(writer.next_index(), 2);
        assert_eq!(writer.pending(), 0);
    }

    #[tokio::test]
    async fn test_unexpected_chunks_rejected() {
        let mut writer = ReassemblyWriter::new(WriterSink::new(Vec::new()), 2);
        writer.accept(1, chunk(1)).await.unwrap();

        assert!(matches!(
            writer.accept(1, chunk(1)).await,
            Err(ReassemblyError::UnexpectedChunk { index: 1 })
        ));
        assert!(matches!(
            writer.accept(2, chunk(2)).await,
            Err(ReassemblyError::UnexpectedChunk { index: 2 })
        ));

        writer.accept(0, chunk(0)).await.unwrap();
        assert!(matches!(
            writer.accept(0, chunk(0)).await,
            Err(ReassemblyError::UnexpectedChunk { index: 0 })
        ));
    }

    #[tokio::test]
    async fn test_channel_sink_streams_chunks() {
        let (mut sink, mut body) = ChannelSink::channel(4);
        let mut writer = ReassemblyWriter::new(&mut sink, 2);
        writer.accept(1, chunk(1)).await.unwrap();
        writer.accept(0, chunk(0)).await.unwrap();
        drop(writer);
        drop(sink);

        let mut out = Vec::new();
        while let Some(piece) = body.next().await {
            out.extend_from_slice(&piece.unwrap());
        }
        assert_eq!(out, expected(2));
    }

    #[tokio::test]
    async fn test_closed_body_is_sink_error() {
        let (mut sink, body) = ChannelSink::channel(1);
        drop(body);

        let mut writer = ReassemblyWriter::new(&mut sink, 1);
        assert!(matches!(
            writer.accept(0, chunk(0)).await,
            Err(ReassemblyError::Sink(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_terminates_body_with_error() {
        let (mut sink, mut body) = ChannelSink::channel(4);
        sink.write_chunk(chunk(0)).await.unwrap();
        sink.abort(io::Error::other("chunk 1 failed")).await;

        assert_eq!(body.next().await.unwrap().unwrap(), chunk(0));
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
    }
}

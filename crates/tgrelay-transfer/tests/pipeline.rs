use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tgrelay_core::{FormatError, Manifest, TransferConfig};
use tgrelay_storage::{BlobStore, ByteStream, StorageBackend, StorageError, StorageResult};
use tgrelay_transfer::{ChannelSink, ReassemblyError, Reassembler, WriterSink};

enum Entry {
    Blob { data: Bytes, delay_ms: u64 },
    Fail { delay_ms: u64 },
}

/// In-memory store whose fetches finish after a per-blob delay.
#[derive(Default)]
struct ScriptedStore {
    entries: Mutex<HashMap<String, Entry>>,
    fetched: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedStore {
    fn blob(&self, id: &str, data: impl Into<Bytes>, delay_ms: u64) {
        self.entries.lock().unwrap().insert(
            id.to_string(),
            Entry::Blob {
                data: data.into(),
                delay_ms,
            },
        );
    }

    fn failing(&self, id: &str, delay_ms: u64) {
        self.entries
            .lock()
            .unwrap()
            .insert(id.to_string(), Entry::Fail { delay_ms });
    }

    fn manifest(&self, id: &str, filename: &str, chunk_ids: &[&str]) {
        let manifest = Manifest::new(
            filename,
            chunk_ids.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        self.blob(id, manifest.encode(), 0);
    }

    fn fetch_count(&self, id: &str) -> usize {
        self.fetched.lock().unwrap().iter().filter(|f| *f == id).count()
    }
}

#[async_trait]
impl BlobStore for ScriptedStore {
    async fn fetch(&self, blob_id: &str) -> StorageResult<ByteStream> {
        self.fetched.lock().unwrap().push(blob_id.to_string());
        let (result, delay_ms) = {
            let entries = self.entries.lock().unwrap();
            match entries.get(blob_id) {
                Some(Entry::Blob { data, delay_ms }) => (Ok(data.clone()), *delay_ms),
                Some(Entry::Fail { delay_ms }) => (
                    Err(StorageError::Transient(format!("{} timed out", blob_id))),
                    *delay_ms,
                ),
                None => (Err(StorageError::NotFound(blob_id.to_string())), 0),
            }
        };

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let data = result?;
        // Split into two pieces like a transport would.
        let mid = data.len() / 2;
        let pieces = vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))];
        Ok(Box::pin(stream::iter(pieces)))
    }

    async fn put(&self, _filename: &str, _caption: &str, data: Bytes) -> StorageResult<String> {
        let mut entries = self.entries.lock().unwrap();
        let id = format!("blob-{}", entries.len());
        entries.insert(id.clone(), Entry::Blob { data, delay_ms: 0 });
        Ok(id)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

fn config(concurrency: usize) -> TransferConfig {
    TransferConfig {
        download_concurrency: concurrency,
        ..TransferConfig::default()
    }
}

#[tokio::test]
async fn test_movie_scenario_out_of_order_completion() {
    let store = Arc::new(ScriptedStore::default());
    store.blob("a", &b"AAAAA"[..], 20);
    store.blob("b", &b"BBBBBBBBBB"[..], 5);
    store.blob("c", &b"CCCCCCCC"[..], 40);
    store.manifest("M", "movie.mp4", &["a", "b", "c"]);

    let reassembler = Reassembler::new(store.clone(), &config(8));
    let mut out = WriterSink::new(Vec::new());
    let (manifest, stats) = reassembler.reassemble("M", &mut out).await.unwrap();

    assert_eq!(manifest.original_filename(), "movie.mp4");
    let bytes = out.into_inner();
    assert_eq!(bytes.len(), 23);
    assert_eq!(bytes, b"AAAAABBBBBBBBBBCCCCCCCC".to_vec());
    assert_eq!(stats.chunks_written, 3);
    assert_eq!(stats.bytes_written, 23);
    // b completes first and waits for a.
    assert_eq!(stats.max_pending, 1);

    for id in ["a", "b", "c"] {
        assert_eq!(store.fetch_count(id), 1);
    }
}

#[tokio::test]
async fn test_hundred_chunks_eight_in_flight() {
    let store = Arc::new(ScriptedStore::default());
    let mut ids = Vec::new();
    let mut expected = Vec::new();
    for i in 0..100usize {
        let id = format!("chunk-{}", i);
        let data = format!("<{:03}>", i);
        expected.extend_from_slice(data.as_bytes());
        // Scrambled delays so completion order differs from index order.
        store.blob(&id, data, ((i * 7) % 11) as u64);
        ids.push(id);
    }
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    store.manifest("M", "big.bin", &id_refs);

    let reassembler = Reassembler::new(store.clone(), &config(8));
    let mut out = WriterSink::new(Vec::new());
    let (_, stats) = reassembler.reassemble("M", &mut out).await.unwrap();

    assert_eq!(out.into_inner(), expected);
    assert_eq!(stats.chunks_written, 100);
    // Most delays are non-zero, so the gate fills up at steady state.
    assert_eq!(store.max_active.load(Ordering::SeqCst), 8);
    for id in &ids {
        assert_eq!(store.fetch_count(id), 1);
    }
}

#[tokio::test]
async fn test_failed_chunk_stops_output_at_gap() {
    let store = Arc::new(ScriptedStore::default());
    store.blob("a", &b"first"[..], 0);
    store.failing("b", 10);
    store.blob("c", &b"third"[..], 0);
    store.manifest("M", "broken.bin", &["a", "b", "c"]);

    let reassembler = Reassembler::new(store.clone(), &config(3));
    let mut out = WriterSink::new(Vec::new());
    let err = reassembler.reassemble("M", &mut out).await.unwrap_err();

    match err {
        ReassemblyError::Fetch { index, source } => {
            assert_eq!(index, 1);
            assert!(source.is_transient());
        }
        other => panic!("Expected fetch error, got {:?}", other),
    }
    // Nothing after the failed chunk reaches the output.
    assert_eq!(out.into_inner(), b"first".to_vec());
}

#[tokio::test]
async fn test_missing_chunk_is_not_found() {
    let store = Arc::new(ScriptedStore::default());
    store.blob("a", &b"data"[..], 0);
    store.manifest("M", "gone.bin", &["a", "deleted"]);

    let reassembler = Reassembler::new(store, &config(2));
    let mut out = WriterSink::new(Vec::new());
    let err = reassembler.reassemble("M", &mut out).await.unwrap_err();

    assert!(matches!(
        err.storage_error(),
        Some(StorageError::NotFound(id)) if id == "deleted"
    ));
}

#[tokio::test]
async fn test_minimal_manifest_rejected() {
    let store = Arc::new(ScriptedStore::default());
    store.blob("M", &b"movie.mp4\n"[..], 0);

    let reassembler = Reassembler::new(store, &config(2));
    let err = reassembler.open_manifest("M").await.unwrap_err();

    assert!(matches!(
        err,
        ReassemblyError::Format(FormatError::TooFewLines { found: 1 })
    ));
}

#[tokio::test]
async fn test_unknown_manifest_id() {
    let store = Arc::new(ScriptedStore::default());
    let reassembler = Reassembler::new(store, &config(2));

    let err = reassembler.open_manifest("nope").await.unwrap_err();
    assert!(matches!(
        err,
        ReassemblyError::Manifest(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_client_disconnect_is_sink_error() {
    let store = Arc::new(ScriptedStore::default());
    store.blob("a", &b"AAAA"[..], 0);
    store.blob("b", &b"BBBB"[..], 0);
    store.manifest("M", "file.bin", &["a", "b"]);

    let reassembler = Reassembler::new(store, &config(2));
    let manifest = reassembler.open_manifest("M").await.unwrap();

    let (mut sink, body) = ChannelSink::channel(1);
    drop(body);

    let err = reassembler.stream_to(&manifest, &mut sink).await.unwrap_err();
    assert!(matches!(err, ReassemblyError::Sink(_)));
}

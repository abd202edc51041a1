//! Application state shared by all handlers

use std::sync::Arc;
use tgrelay_core::Config;
use tgrelay_storage::BlobStore;
use tgrelay_transfer::{ChunkUploader, Reassembler};

pub struct AppState {
    pub config: Config,
    pub reassembler: Reassembler,
    pub uploader: ChunkUploader,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn BlobStore>) -> Self {
        let transfer = config.transfer();
        Self {
            reassembler: Reassembler::new(store.clone(), transfer),
            uploader: ChunkUploader::new(store, transfer),
            config,
        }
    }
}

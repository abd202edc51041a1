//! Test helpers: build AppState and router for integration tests.
//!
//! The app runs against the local blob store in a temporary directory.

use axum_test::TestServer;
use std::sync::Arc;
use tempfile::TempDir;
use tgrelay_api::setup::routes;
use tgrelay_api::state::AppState;
use tgrelay_core::{Config, RelayConfig, StorageBackend, TransferConfig};
use tgrelay_storage::{BlobStore, LocalStore};

pub const TEST_PASSWORD: &str = "test-secret";

/// Largest piece the uploader accepts in tests.
pub const TEST_MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Test application: server plus the storage directory it owns.
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<dyn BlobStore>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn create_test_config(storage_path: &str, chunk_size_bytes: usize) -> Config {
    Config::new(RelayConfig {
        server_port: 0,
        environment: "test".to_string(),
        access_password: TEST_PASSWORD.to_string(),
        base_url: None,
        storage_backend: StorageBackend::Local,
        telegram: None,
        local_storage_path: Some(storage_path.to_string()),
        transfer: TransferConfig {
            download_concurrency: 3,
            chunk_size_bytes,
            upload_concurrency: 2,
            files_concurrency: 5,
            max_chunk_bytes: TEST_MAX_CHUNK_BYTES,
        },
    })
}

/// Shared state over local storage with 16 KiB server-side chunks.
pub async fn setup_test_state() -> (Arc<AppState>, Config, Arc<dyn BlobStore>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let storage_path = temp_dir.path().to_string_lossy().to_string();
    let config = create_test_config(&storage_path, 16 * 1024);

    let store: Arc<dyn BlobStore> = Arc::new(
        LocalStore::new(temp_dir.path())
            .await
            .expect("Failed to create local storage")
            .with_max_blob_bytes(TEST_MAX_CHUNK_BYTES as u64),
    );

    let state = Arc::new(AppState::new(config.clone(), store.clone()));
    (state, config, store, temp_dir)
}

/// Setup test app with local storage and 16 KiB server-side chunks.
pub async fn setup_test_app() -> TestApp {
    let (state, config, store, temp_dir) = setup_test_state().await;
    let router = routes::setup_routes(&config, state);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        store,
        _temp_dir: temp_dir,
    }
}

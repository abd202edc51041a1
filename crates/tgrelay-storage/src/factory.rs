#[cfg(feature = "storage-local")]
use crate::LocalStore;
#[cfg(feature = "storage-telegram")]
use crate::TelegramStore;
use crate::{BlobStore, StorageBackend, StorageError, StorageResult};
use std::sync::Arc;
use tgrelay_core::Config;

/// Create a blob store based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn BlobStore>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-telegram")]
        StorageBackend::Telegram => {
            let telegram = config.telegram().ok_or_else(|| {
                StorageError::ConfigError("BOT_TOKEN and CHAT_ID not configured".to_string())
            })?;

            let store = TelegramStore::new(telegram)?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-telegram"))]
        StorageBackend::Telegram => Err(StorageError::ConfigError(
            "Telegram storage backend not available (storage-telegram feature not enabled)"
                .to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let store = LocalStore::new(base_path)
                .await?
                .with_max_blob_bytes(config.transfer().max_chunk_bytes as u64);
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tgrelay_core::RelayConfig;

    #[tokio::test]
    async fn test_create_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let relay = RelayConfig::from_vars(|key: &str| match key {
            "ACCESS_PWD" => Some("secret".to_string()),
            "STORAGE_BACKEND" => Some("local".to_string()),
            "LOCAL_STORAGE_PATH" => Some(path.clone()),
            _ => None,
        })
        .unwrap();

        let store = create_storage(&Config::new(relay)).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Local);
    }
}

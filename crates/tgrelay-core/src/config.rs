//! Configuration module
//!
//! This module provides the configuration structures for the relay: server
//! settings, storage backend selection, Telegram credentials and the transfer
//! tuning values injected into the scheduler, writer and uploader.

use std::env;

use crate::storage_types::StorageBackend;

// Common constants
const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_DOWNLOAD_THREADS: usize = 8;
const DEFAULT_CHUNK_SIZE_MB: usize = 20;
const MAX_CHUNK_SIZE_MB: usize = 50;
const DEFAULT_CHUNK_CONCURRENT: usize = 8;
const DEFAULT_FILES_CONCURRENT: usize = 5;
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

const MIB: usize = 1024 * 1024;

/// Transfer tuning shared by the download and upload paths.
///
/// Read-only after startup; every component receives its own copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferConfig {
    /// Maximum number of chunk fetches in flight for one download.
    pub download_concurrency: usize,
    /// Size of the pieces a whole-file upload is split into.
    pub chunk_size_bytes: usize,
    /// Maximum number of piece uploads in flight for one whole-file upload.
    pub upload_concurrency: usize,
    /// Number of files a browser client should upload in parallel (advertised only).
    pub files_concurrency: usize,
    /// Largest chunk accepted on either path.
    pub max_chunk_bytes: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: DEFAULT_DOWNLOAD_THREADS,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_MB * MIB,
            upload_concurrency: DEFAULT_CHUNK_CONCURRENT,
            files_concurrency: DEFAULT_FILES_CONCURRENT,
            max_chunk_bytes: MAX_CHUNK_SIZE_MB * MIB,
        }
    }
}

impl TransferConfig {
    pub fn chunk_size_mb(&self) -> usize {
        self.chunk_size_bytes / MIB
    }
}

/// Telegram Bot API settings
#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    pub api_url: String,
    pub proxy: Option<String>,
}

/// Relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub server_port: u16,
    pub environment: String,
    pub access_password: String,
    /// Public base URL used when building download links (e.g. `https://files.example.com`).
    pub base_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub telegram: Option<TelegramConfig>,
    pub local_storage_path: Option<String>,
    pub transfer: TransferConfig,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<RelayConfig>);

impl Config {
    fn as_relay(&self) -> &RelayConfig {
        &self.0
    }

    pub fn new(config: RelayConfig) -> Self {
        Config(Box::new(config))
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.as_relay().environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = RelayConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_relay().validate()
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.as_relay().server_port
    }

    pub fn environment(&self) -> &str {
        &self.as_relay().environment
    }

    pub fn access_password(&self) -> &str {
        &self.as_relay().access_password
    }

    pub fn base_url(&self) -> Option<&str> {
        self.as_relay().base_url.as_deref()
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_relay().storage_backend
    }

    pub fn telegram(&self) -> Option<&TelegramConfig> {
        self.as_relay().telegram.as_ref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_relay().local_storage_path.as_deref()
    }

    pub fn transfer(&self) -> &TransferConfig {
        &self.as_relay().transfer
    }
}

/// Parse a positive integer, falling back to `default` when missing, malformed or zero.
fn positive_or(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(default)
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from a variable lookup.
    ///
    /// `from_env` uses the process environment; the binary layers command-line
    /// overrides on top of it through the same lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let server_port = match var("PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("PORT must be a valid port number: {}", e))?,
            None => DEFAULT_SERVER_PORT,
        };

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(s) => s.parse::<StorageBackend>()?,
            None => StorageBackend::Telegram,
        };

        let telegram = match (var("BOT_TOKEN"), var("CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => {
                let chat_id = chat_id.trim().parse::<i64>().map_err(|e| {
                    anyhow::anyhow!("CHAT_ID must be a numeric chat identifier: {}", e)
                })?;
                Some(TelegramConfig {
                    bot_token,
                    chat_id,
                    api_url: var("TELEGRAM_API_URL")
                        .map(|u| u.trim_end_matches('/').to_string())
                        .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
                    proxy: var("PROXY"),
                })
            }
            _ => None,
        };

        // Chunk size outside 1..=50 MB keeps the default, matching the browser client limits.
        let chunk_size_mb = var("CHUNK_SIZE_MB")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&v| v > 0 && v <= MAX_CHUNK_SIZE_MB)
            .unwrap_or(DEFAULT_CHUNK_SIZE_MB);

        let transfer = TransferConfig {
            download_concurrency: positive_or(var("DOWNLOAD_THREADS"), DEFAULT_DOWNLOAD_THREADS),
            chunk_size_bytes: chunk_size_mb * MIB,
            upload_concurrency: positive_or(var("CHUNK_CONCURRENT"), DEFAULT_CHUNK_CONCURRENT),
            files_concurrency: positive_or(var("FILES_CONCURRENT"), DEFAULT_FILES_CONCURRENT),
            max_chunk_bytes: MAX_CHUNK_SIZE_MB * MIB,
        };

        let config = RelayConfig {
            server_port,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            access_password: var("ACCESS_PWD").unwrap_or_default(),
            base_url: var("BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            storage_backend,
            telegram,
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            transfer,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.access_password.is_empty() {
            return Err(anyhow::anyhow!("ACCESS_PWD must be set"));
        }

        if self.transfer.download_concurrency == 0 || self.transfer.upload_concurrency == 0 {
            return Err(anyhow::anyhow!("Transfer concurrency must be at least 1"));
        }

        if self.transfer.chunk_size_bytes == 0
            || self.transfer.chunk_size_bytes > self.transfer.max_chunk_bytes
        {
            return Err(anyhow::anyhow!(
                "CHUNK_SIZE_MB must be between 1 and {}",
                self.transfer.max_chunk_bytes / MIB
            ));
        }

        match self.storage_backend {
            StorageBackend::Telegram => {
                if self.telegram.is_none() {
                    return Err(anyhow::anyhow!(
                        "BOT_TOKEN and CHAT_ID must be set when using the telegram storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_telegram() {
        let config = RelayConfig::from_vars(lookup(&[
            ("ACCESS_PWD", "secret"),
            ("BOT_TOKEN", "123:abc"),
            ("CHAT_ID", "-100200300"),
        ]))
        .unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.storage_backend, StorageBackend::Telegram);
        assert_eq!(config.transfer, TransferConfig::default());
        assert_eq!(config.transfer.chunk_size_mb(), 20);
        let telegram = config.telegram.unwrap();
        assert_eq!(telegram.chat_id, -100200300);
        assert_eq!(telegram.api_url, "https://api.telegram.org");
        assert!(telegram.proxy.is_none());
    }

    #[test]
    fn test_transfer_overrides_and_fallbacks() {
        let config = RelayConfig::from_vars(lookup(&[
            ("ACCESS_PWD", "secret"),
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/tmp/blobs"),
            ("DOWNLOAD_THREADS", "16"),
            ("CHUNK_SIZE_MB", "80"),
            ("CHUNK_CONCURRENT", "0"),
            ("FILES_CONCURRENT", "three"),
        ]))
        .unwrap();

        assert_eq!(config.transfer.download_concurrency, 16);
        assert_eq!(config.transfer.chunk_size_mb(), 20);
        assert_eq!(config.transfer.upload_concurrency, 8);
        assert_eq!(config.transfer.files_concurrency, 5);
    }

    #[test]
    fn test_missing_password_rejected() {
        let err = RelayConfig::from_vars(lookup(&[("BOT_TOKEN", "t"), ("CHAT_ID", "1")]))
            .unwrap_err();
        assert!(err.to_string().contains("ACCESS_PWD"));
    }

    #[test]
    fn test_telegram_requires_credentials() {
        let err = RelayConfig::from_vars(lookup(&[("ACCESS_PWD", "secret")])).unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));
    }

    #[test]
    fn test_invalid_chat_id_rejected() {
        let err = RelayConfig::from_vars(lookup(&[
            ("ACCESS_PWD", "secret"),
            ("BOT_TOKEN", "t"),
            ("CHAT_ID", "@channel"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHAT_ID"));
    }

    #[test]
    fn test_production_detection() {
        let config = Config::new(
            RelayConfig::from_vars(lookup(&[
                ("ACCESS_PWD", "secret"),
                ("STORAGE_BACKEND", "local"),
                ("LOCAL_STORAGE_PATH", "/tmp/blobs"),
                ("ENVIRONMENT", "Prod"),
                ("BASE_URL", "https://files.example.com/"),
            ]))
            .unwrap(),
        );
        assert!(config.is_production());
        assert_eq!(config.base_url(), Some("https://files.example.com"));
    }
}

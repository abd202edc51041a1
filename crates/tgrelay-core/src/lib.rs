//! tgrelay Core Library
//!
//! This crate provides the manifest format, error types and configuration
//! that are shared across all tgrelay components.

pub mod config;
pub mod error;
pub mod manifest;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, RelayConfig, TelegramConfig, TransferConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use manifest::{FormatError, Manifest, ManifestBuilder, MANIFEST_FILENAME};
pub use storage_types::StorageBackend;

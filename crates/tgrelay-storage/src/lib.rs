//! tgrelay Storage Library
//!
//! This crate provides the blob storage abstraction used by the relay and its
//! implementations for the Telegram Bot API and the local filesystem.
//!
//! # Blob identifiers
//!
//! Every stored blob is addressed by an opaque identifier returned at upload
//! time. For Telegram this is the document `file_id`; for the local backend
//! it is a random UUID. Identifiers never encode position or ownership: the
//! manifest is the only record of which blobs form a file.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-telegram")]
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStore;
#[cfg(feature = "storage-telegram")]
pub use telegram::TelegramStore;
pub use tgrelay_core::StorageBackend;
pub use traits::{collect_blob, BlobStore, ByteStream, StorageError, StorageResult};

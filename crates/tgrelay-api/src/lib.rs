//! tgrelay API Library
//!
//! HTTP surface of the relay: upload endpoints that split files into chunks,
//! the streaming download endpoint and application setup.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
mod telemetry;
mod utils;

pub use error::{ErrorResponse, HttpAppError};

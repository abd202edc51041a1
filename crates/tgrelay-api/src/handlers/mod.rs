pub mod config;
pub mod download;
pub mod health;
pub mod upload;
pub mod verify;

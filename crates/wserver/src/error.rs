//! Error types for the server crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Photo is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Photo is empty")]
    Empty,

    #[error("Failed to store photo: {0}")]
    Io(#[from] std::io::Error),
}

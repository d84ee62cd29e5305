//! Error handling and custom error types
//!
//! Provides unified error handling across the gateway using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference backend error: {0}")]
    AiProvider(String),

    #[error("Inference backend timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    ModelNotAvailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the depth feed

use thiserror::Error;

/// Depth feed errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Unsupported feed kind: {0}")]
    UnsupportedFeedKind(String),

    #[error("Malformed price level: {0}")]
    MalformedLevel(String),

    #[error("Connection retries exhausted after {0} attempts")]
    RetryExhausted(u32),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

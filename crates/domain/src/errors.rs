//! Error types used throughout the service

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Channelog
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ChannelogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ChannelogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Channelog operations
pub type Result<T> = std::result::Result<T, ChannelogError>;

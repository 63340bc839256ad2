//! Error types for the Guru connector

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Missing credentials for source: {0}")]
    MissingCredential(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus {
        status: u16,
        body: String,
    },

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),
}

impl IngestionError {
    /// Errors the operator fixes through credentials or settings
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IngestionError::MissingCredential(_)
                | IngestionError::ConfigError(_)
                | IngestionError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;

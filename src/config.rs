//! Configuration for the Guru connector

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::GuruCredentials;
use crate::error::{IngestionError, Result};
use crate::http_client::HttpClientConfig;

/// Documents per batch, also sent as `maxResults`
pub const DEFAULT_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Credentials
    pub guru_user: Option<String>,
    pub guru_user_token: Option<String>,

    // Batching
    #[serde(default = "default_batch_size")]
    pub index_batch_size: usize,

    // HTTP
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    // Checkpointing
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_poll_window")]
    pub default_poll_window: String,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

fn default_poll_window() -> String {
    "1d".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guru_user: None,
            guru_user_token: None,
            index_batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            checkpoint_dir: default_checkpoint_dir(),
            default_poll_window: default_poll_window(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        // Build config from environment
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.index_batch_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "INDEX_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(IngestionError::InvalidConfig(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Credentials, when both halves are configured
    pub fn credentials(&self) -> Option<GuruCredentials> {
        GuruCredentials::from_parts(self.guru_user.as_deref(), self.guru_user_token.as_deref())
    }

    /// Checks if Guru credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..Default::default()
        }
    }
}

//! Data sources for ingestion
//!
//! A source hands out `PageWalker`s: either a full load or a poll bounded by
//! a time window. Both are lazy; nothing is requested until the first batch
//! is pulled.

pub mod guru;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pagination::PageWalker;
use crate::time_window::SecondsSinceUnixEpoch;

/// Metadata about a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Unique identifier for the source
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description
    pub description: String,
    /// Whether the source supports pagination
    pub supports_pagination: bool,
    /// Whether the source supports time-bounded polling
    pub supports_poll: bool,
}

/// Sources that can load everything they hold
pub trait LoadConnector: Send + Sync {
    /// Gets metadata about this source
    fn metadata(&self) -> &SourceMetadata;

    /// Starts a fresh full load from the first page
    fn load_from_state(&self) -> Result<PageWalker>;

    /// Gets the source ID
    fn id(&self) -> &str {
        &self.metadata().id
    }
}

/// Sources that can restrict a load to documents modified in `[start, end)`
pub trait PollConnector: LoadConnector {
    fn poll_source(&self, start: SecondsSinceUnixEpoch, end: SecondsSinceUnixEpoch) -> Result<PageWalker>;
}

pub use guru::{GuruConnector, GURU_QUERY_ENDPOINT};

//! Guru Ingestion
//! Pull-based connector that turns Guru knowledge-base cards into batched
//! documents for an indexing pipeline.
//!
//! Features:
//! - Full loads and time-window polls over the same pagination machinery
//! - Server-driven pagination via opaque `Link: rel="next-page"` URLs
//! - Bounded batches released as soon as they fill up
//! - Credential checks before any network I/O
//! - Poll checkpointing for back-to-back incremental runs

pub mod checkpoint;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http_client;
pub mod normalize;
pub mod pagination;
pub mod schemas;
pub mod sources;
pub mod time_window;

pub use credentials::GuruCredentials;
pub use error::{IngestionError, Result};
pub use http_client::{HttpTransport, PageRequest, PageResponse, Transport};
pub use normalize::{BasicHtmlExtractor, TextExtractor};
pub use pagination::PageWalker;
pub use schemas::{Batch, Document, DocumentSource, GuruCard, Section};
pub use sources::{GuruConnector, LoadConnector, PollConnector};
pub use time_window::{SecondsSinceUnixEpoch, TimeWindow};

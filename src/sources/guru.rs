//! Guru Data Source
//!
//! Loads knowledge cards from Guru's search API.
//! https://developer.getguru.com/reference/getv1searchquery
//!
//! Guru paginates by handing back a fresh URL in the `Link` header
//! (`rel="next-page"`); a 204 means there is nothing (more) to return.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::{LoadConnector, PollConnector, SourceMetadata};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::credentials::{self, GuruCredentials};
use crate::error::{IngestionError, Result};
use crate::http_client::{HttpClientConfig, HttpTransport, PageRequest, Transport};
use crate::normalize::{BasicHtmlExtractor, TextExtractor};
use crate::pagination::PageWalker;
use crate::time_window::{SecondsSinceUnixEpoch, TimeWindow};

pub const GURU_QUERY_ENDPOINT: &str = "https://api.getguru.com/api/v1/search/query";

/// Guru knowledge-base connector
pub struct GuruConnector {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn TextExtractor>,
    credentials: Option<GuruCredentials>,
    batch_size: usize,
    query_endpoint: String,
    metadata: SourceMetadata,
}

impl GuruConnector {
    /// Creates a connector over the default HTTP transport
    pub fn new(batch_size: usize, http_config: HttpClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(http_config)?;
        Self::with_transport(batch_size, Arc::new(transport))
    }

    /// Creates a connector over any transport
    pub fn with_transport(batch_size: usize, transport: Arc<dyn Transport>) -> Result<Self> {
        if batch_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }

        let metadata = SourceMetadata {
            id: "guru".to_string(),
            name: "Guru".to_string(),
            description: "Guru knowledge-base cards".to_string(),
            supports_pagination: true,
            supports_poll: true,
        };

        Ok(Self {
            transport,
            extractor: Arc::new(BasicHtmlExtractor),
            credentials: None,
            batch_size,
            query_endpoint: GURU_QUERY_ENDPOINT.to_string(),
            metadata,
        })
    }

    /// Connector with the default batch size and HTTP settings
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_BATCH_SIZE, HttpClientConfig::default())
    }

    /// Sets both secrets at once
    pub fn set_credentials(&mut self, credentials: GuruCredentials) {
        self.credentials = Some(credentials);
    }

    /// Builder form of `set_credentials`
    pub fn with_credentials(mut self, credentials: GuruCredentials) -> Self {
        self.set_credentials(credentials);
        self
    }

    /// Loads credentials from a mapping with `guru_user` and `guru_user_token`.
    ///
    /// On a missing key the connector is left without credentials.
    pub fn load_credentials(&mut self, credentials: &HashMap<String, String>) -> Result<()> {
        match GuruCredentials::from_map(credentials) {
            Ok(creds) => {
                self.credentials = Some(creds);
                Ok(())
            }
            Err(e) => {
                self.credentials = None;
                Err(e)
            }
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Swaps the HTML-to-text extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Points the connector at another search endpoint, e.g. a mock server
    pub fn with_query_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.query_endpoint = endpoint.into();
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Shared entry for both load modes; `filter` is the `q` expression
    fn process_cards(&self, filter: Option<String>) -> Result<PageWalker> {
        let credentials = credentials::require(self.credentials.as_ref())?.clone();

        let mut query = vec![("maxResults".to_string(), self.batch_size.to_string())];
        if let Some(filter) = filter {
            query.push(("q".to_string(), filter));
        }

        debug!(
            source = "guru",
            endpoint = %self.query_endpoint,
            batch_size = self.batch_size,
            filtered = query.len() > 1,
            "Starting card walk"
        );

        Ok(PageWalker::new(
            self.transport.clone(),
            self.extractor.clone(),
            credentials,
            PageRequest::new(self.query_endpoint.clone(), query),
            self.batch_size,
        ))
    }
}

impl LoadConnector for GuruConnector {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn load_from_state(&self) -> Result<PageWalker> {
        self.process_cards(None)
    }
}

impl PollConnector for GuruConnector {
    fn poll_source(&self, start: SecondsSinceUnixEpoch, end: SecondsSinceUnixEpoch) -> Result<PageWalker> {
        let window = TimeWindow::new(start, end);
        if window.is_inverted() {
            info!(start, end, "Poll window is inverted, expecting no cards");
        }
        let filter = window.filter_expression()?;
        self.process_cards(Some(filter))
    }
}

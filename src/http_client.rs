//! HTTP Client Module
//!
//! Provides the transport the pagination walker talks to:
//! - A `Transport` trait so the walker can be driven by a test double
//! - A reqwest-backed implementation with basic auth and timeouts
//! - `Link` header parsing for server-driven pagination
//!
//! A failed page ends the walk; requests are never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::credentials::GuruCredentials;
use crate::error::{IngestionError, Result};

/// Link relation Guru uses for the continuation URL
pub const NEXT_PAGE_REL: &str = "next-page";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("Guru-Ingestion/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One request the walker wants performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    /// Query parameters; empty for continuation URLs
    pub query: Vec<(String, String)>,
}

impl PageRequest {
    pub fn new(url: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            query,
        }
    }

    /// A continuation request, replayed exactly as the server supplied it
    pub fn continuation(url: impl Into<String>) -> Self {
        Self::new(url, Vec::new())
    }
}

/// Raw outcome of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
    /// Opaque cursor for the next page, if the server sent one
    pub next_page: Option<String>,
}

impl PageResponse {
    pub fn is_no_content(&self) -> bool {
        self.status == StatusCode::NO_CONTENT.as_u16()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs authenticated GETs on behalf of the walker
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, credentials: &GuruCredentials, request: &PageRequest) -> Result<PageResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(IngestionError::HttpError)?;

        Ok(Self { client })
    }

    /// Creates a transport with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, credentials: &GuruCredentials, request: &PageRequest) -> Result<PageResponse> {
        debug!(
            url = %request.url,
            params = request.query.len(),
            "Executing HTTP request"
        );

        let mut builder = self
            .client
            .get(&request.url)
            .basic_auth(credentials.user(), Some(credentials.user_token()));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let response = builder.send().await?;
        let status = response.status();
        let request_url = response.url().clone();

        let next_page = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| find_link(value, NEXT_PAGE_REL))
            .map(|link| resolve_link(&request_url, &link))
            .transpose()?;

        let body = response.text().await?;

        debug!(
            status = %status,
            has_next = next_page.is_some(),
            bytes = body.len(),
            "Request completed"
        );

        Ok(PageResponse {
            status: status.as_u16(),
            body,
            next_page,
        })
    }
}

/// Finds the target of the link with relation `rel` in a `Link` header value.
///
/// Handles `<url>; rel="a b"` lists with quoted or bare relation values.
pub fn find_link(header: &str, rel: &str) -> Option<String> {
    let mut rest = header;

    loop {
        let start = rest.find('<')?;
        let end = start + rest[start..].find('>')?;
        let target = &rest[start + 1..end];
        let after = &rest[end + 1..];

        // Params run until the next link entry
        let params_end = after
            .match_indices(',')
            .map(|(comma, _)| comma)
            .find(|&comma| after[comma + 1..].trim_start().starts_with('<'));
        let (params, next) = match params_end {
            Some(comma) => (&after[..comma], &after[comma + 1..]),
            None => (after, ""),
        };

        let matches = params.split(';').any(|param| {
            let mut kv = param.splitn(2, '=');
            let key = kv.next().unwrap_or_default().trim();
            let value = kv.next().unwrap_or_default().trim().trim_matches('"');
            key.eq_ignore_ascii_case("rel")
                && value.split_whitespace().any(|r| r.eq_ignore_ascii_case(rel))
        });

        if matches {
            return Some(target.trim().to_string());
        }
        if next.is_empty() {
            return None;
        }
        rest = next;
    }
}

/// Resolves a possibly relative link against the URL that returned it
pub fn resolve_link(base: &Url, link: &str) -> Result<String> {
    base.join(link)
        .map(|url| url.to_string())
        .map_err(|e| IngestionError::InvalidUrl(format!("{}: {}", link, e)))
}

//! Pagination walker
//!
//! Walks Guru's search endpoint page by page. The first request carries the
//! caller's query parameters; every later request replays the opaque
//! `next-page` URL from the previous response untouched.
//!
//! Documents are buffered and released in batches of at most `batch_size`.
//! A page is fully decoded and normalized before any of its batches are
//! released, so a failing page contributes nothing.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::{debug, info};

use crate::credentials::GuruCredentials;
use crate::error::{IngestionError, Result};
use crate::http_client::{PageRequest, Transport};
use crate::normalize::{normalize_card, TextExtractor};
use crate::schemas::{Batch, Document, GuruCard};

/// Where the walker is in its page sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkState {
    /// Nothing requested yet
    Start,
    /// Next request goes to the opaque continuation URL
    Fetching { cursor: String },
    /// Server answered 204
    EmptyPage,
    /// Last page had no continuation link
    NoNextLink,
    /// Walk aborted by an error
    Failed,
}

impl WalkState {
    fn is_terminal(&self) -> bool {
        matches!(self, WalkState::EmptyPage | WalkState::NoNextLink | WalkState::Failed)
    }
}

/// Lazy, finite sequence of document batches from one extraction call
pub struct PageWalker {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn TextExtractor>,
    credentials: GuruCredentials,
    first_request: PageRequest,
    batch_size: usize,
    state: WalkState,
    buffer: Vec<Document>,
    ready: VecDeque<Batch>,
    pages_fetched: u32,
    documents_emitted: usize,
}

impl PageWalker {
    pub fn new(
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn TextExtractor>,
        credentials: GuruCredentials,
        first_request: PageRequest,
        batch_size: usize,
    ) -> Self {
        Self {
            transport,
            extractor,
            credentials,
            first_request,
            batch_size: batch_size.max(1),
            state: WalkState::Start,
            buffer: Vec::new(),
            ready: VecDeque::new(),
            pages_fetched: 0,
            documents_emitted: 0,
        }
    }

    pub fn state(&self) -> &WalkState {
        &self.state
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn documents_emitted(&self) -> usize {
        self.documents_emitted
    }

    /// Pulls the next batch, fetching pages as needed.
    ///
    /// Returns `Ok(None)` once the walk has ended. After an error the walk
    /// is over and later calls return `Ok(None)`.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            if let Some(batch) = self.ready.pop_front() {
                self.documents_emitted += batch.len();
                return Ok(Some(batch));
            }

            if self.state.is_terminal() {
                return Ok(None);
            }

            if let Err(e) = self.fetch_page().await {
                self.state = WalkState::Failed;
                self.buffer.clear();
                return Err(e);
            }
        }
    }

    /// Drains the walker into a vector; mostly useful for small loads and tests
    pub async fn collect_batches(mut self) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Adapts the walker into a `Stream`; the stream ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> + Send {
        stream::try_unfold(self, |mut walker| async move {
            let next = walker.next_batch().await?;
            Ok::<_, IngestionError>(next.map(|batch| (batch, walker)))
        })
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let request = match &self.state {
            WalkState::Start => self.first_request.clone(),
            WalkState::Fetching { cursor } => PageRequest::continuation(cursor.clone()),
            _ => return Ok(()),
        };

        let response = self.transport.get(&self.credentials, &request).await?;
        self.pages_fetched += 1;

        if response.is_no_content() {
            debug!(page = self.pages_fetched, "No content, ending walk");
            self.state = WalkState::EmptyPage;
            self.flush();
            self.log_finished();
            return Ok(());
        }

        if !response.is_success() {
            return Err(IngestionError::UnexpectedStatus {
                status: response.status,
                body: response.body,
            });
        }

        let cards: Vec<GuruCard> = serde_json::from_str(&response.body)?;
        let documents = cards
            .iter()
            .map(|card| normalize_card(card, self.extractor.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            page = self.pages_fetched,
            cards = documents.len(),
            has_next = response.next_page.is_some(),
            "Fetched page"
        );

        for document in documents {
            self.buffer.push(document);
            if self.buffer.len() >= self.batch_size {
                let full = std::mem::take(&mut self.buffer);
                self.ready.extend(Batch::from_documents(full));
            }
        }

        match response.next_page {
            Some(cursor) => self.state = WalkState::Fetching { cursor },
            None => {
                self.state = WalkState::NoNextLink;
                self.flush();
                self.log_finished();
            }
        }

        Ok(())
    }

    fn flush(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        self.ready.extend(Batch::from_documents(rest));
    }

    fn log_finished(&self) {
        let pending: usize = self.ready.iter().map(Batch::len).sum();
        info!(
            pages = self.pages_fetched,
            documents = self.documents_emitted + pending,
            state = ?self.state,
            "Finished walking Guru cards"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::PageResponse;
    use crate::normalize::BasicHtmlExtractor;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Replays canned responses and records every request it sees
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<PageResponse>>>,
        pub(crate) requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Result<PageResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, _credentials: &GuruCredentials, request: &PageRequest) -> Result<PageResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    fn card_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "preferredPhrase": format!("Card {}", id),
            "content": format!("<p>Body {}</p>", id),
            "slug": format!("slug-{}", id),
            "lastModified": "2024-01-15T10:00:00.000+0000",
        })
    }

    fn page(ids: &[&str], next: Option<&str>) -> Result<PageResponse> {
        let cards: Vec<_> = ids.iter().map(|id| card_json(id)).collect();
        Ok(PageResponse {
            status: 200,
            body: serde_json::to_string(&cards).unwrap(),
            next_page: next.map(str::to_string),
        })
    }

    fn no_content() -> Result<PageResponse> {
        Ok(PageResponse {
            status: 204,
            body: String::new(),
            next_page: None,
        })
    }

    fn walker(transport: Arc<ScriptedTransport>, batch_size: usize) -> PageWalker {
        PageWalker::new(
            transport,
            Arc::new(BasicHtmlExtractor),
            GuruCredentials::new("user", "token"),
            PageRequest::new(
                "https://api.test/search/query",
                vec![("maxResults".to_string(), batch_size.to_string())],
            ),
            batch_size,
        )
    }

    fn ids(batches: &[Batch]) -> Vec<Vec<String>> {
        batches
            .iter()
            .map(|b| b.iter().map(|d| d.id.clone()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_three_plus_two_with_batch_of_four() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            page(&["1", "2", "3"], Some("https://api.test/next?cursor=p2")),
            page(&["4", "5"], None),
        ]));

        let batches = walker(transport.clone(), 4).collect_batches().await.unwrap();

        assert_eq!(
            ids(&batches),
            vec![vec!["1", "2", "3", "4"], vec!["5"]]
        );
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query, vec![("maxResults".to_string(), "4".to_string())]);
        assert_eq!(requests[1], PageRequest::continuation("https://api.test/next?cursor=p2"));
    }

    #[tokio::test]
    async fn test_no_content_first_page_yields_nothing() {
        let transport = Arc::new(ScriptedTransport::new(vec![no_content()]));
        let mut walker = walker(transport, 4);

        assert!(walker.next_batch().await.unwrap().is_none());
        assert_eq!(walker.state(), &WalkState::EmptyPage);
        assert!(walker.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_array_page_yields_nothing() {
        let transport = Arc::new(ScriptedTransport::new(vec![page(&[], None)]));
        let batches = walker(transport, 3).collect_batches().await.unwrap();
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn test_no_content_after_pages_flushes_remainder() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            page(&["1", "2", "3"], Some("https://api.test/next")),
            no_content(),
        ]));
        let batches = walker(transport, 2).collect_batches().await.unwrap();
        assert_eq!(ids(&batches), vec![vec!["1", "2"], vec!["3"]]);
    }

    #[tokio::test]
    async fn test_large_page_is_split_mid_page() {
        let transport = Arc::new(ScriptedTransport::new(vec![page(
            &["a", "b", "c", "d", "e", "f", "g"],
            None,
        )]));
        let batches = walker(transport, 3).collect_batches().await.unwrap();
        assert_eq!(
            ids(&batches),
            vec![vec!["a", "b", "c"], vec!["d", "e", "f"], vec!["g"]]
        );
    }

    #[tokio::test]
    async fn test_every_partition_preserves_documents() {
        let all: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        let partitions: Vec<Vec<usize>> = vec![vec![7], vec![3, 4], vec![1, 1, 5], vec![2, 0, 2, 3]];

        for sizes in &partitions {
            for batch_size in [1, 2, 3, 7, 50] {
                let mut responses = Vec::new();
                let mut offset = 0;
                for (i, size) in sizes.iter().enumerate() {
                    let chunk: Vec<&str> = all[offset..offset + size].iter().map(String::as_str).collect();
                    offset += size;
                    let next = (i + 1 < sizes.len()).then(|| format!("https://api.test/p{}", i + 1));
                    responses.push(page(&chunk, next.as_deref()));
                }

                let transport = Arc::new(ScriptedTransport::new(responses));
                let batches = walker(transport, batch_size).collect_batches().await.unwrap();

                assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
                let flat: Vec<String> = batches.into_iter().flatten().map(|d| d.id).collect();
                assert_eq!(flat, all, "pages {:?}, batch size {}", sizes, batch_size);
            }
        }
    }

    #[tokio::test]
    async fn test_failing_page_ends_walk_after_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            page(&["1", "2"], Some("https://api.test/p2")),
            Ok(PageResponse {
                status: 200,
                body: "not json".to_string(),
                next_page: None,
            }),
        ]));
        let mut walker = walker(transport, 2);

        let first = walker.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let err = walker.next_batch().await.unwrap_err();
        assert!(matches!(err, IngestionError::JsonError(_)));
        assert_eq!(walker.state(), &WalkState::Failed);
        assert!(walker.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_page_discards_buffered_records() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            page(&["1"], Some("https://api.test/p2")),
            Ok(PageResponse {
                status: 500,
                body: "boom".to_string(),
                next_page: None,
            }),
        ]));
        let mut walker = walker(transport, 5);

        let err = walker.next_batch().await.unwrap_err();
        assert!(matches!(err, IngestionError::UnexpectedStatus { status: 500, .. }));
        assert!(walker.next_batch().await.unwrap().is_none());
        assert_eq!(walker.documents_emitted(), 0);
    }

    #[tokio::test]
    async fn test_invalid_card_timestamp_fails_page() {
        let mut bad = card_json("x");
        bad["lastModified"] = serde_json::json!("whenever");
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(PageResponse {
            status: 200,
            body: serde_json::to_string(&vec![card_json("ok"), bad]).unwrap(),
            next_page: None,
        })]));

        let err = walker(transport, 1).collect_batches().await.unwrap_err();
        assert!(matches!(err, IngestionError::InvalidTimestamp(_)));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(IngestionError::InvalidUrl(
            "bad".to_string(),
        ))]));
        let err = walker(transport, 1).collect_batches().await.unwrap_err();
        assert!(matches!(err, IngestionError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            page(&["1", "2", "3"], Some("https://api.test/p2")),
            page(&["4"], None),
        ]));

        let batches: Vec<Result<Batch>> = walker(transport, 2).into_stream().collect().await;
        let sizes: Vec<usize> = batches.into_iter().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[tokio::test]
    async fn test_lazy_fetching() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            page(&["1", "2"], Some("https://api.test/p2")),
            page(&["3"], None),
        ]));
        let mut walker = walker(transport.clone(), 2);

        assert_eq!(transport.requests.lock().unwrap().len(), 0);
        walker.next_batch().await.unwrap();
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
        assert_eq!(walker.pages_fetched(), 1);
    }
}

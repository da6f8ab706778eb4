//! Lazy paging over query results

use crate::models::{Node, NodeDocument, StoreQuery};
use crate::services::error::NodeServiceError;
use crate::transport::NodeStore;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;

/// Pull-based sequence of query results
///
/// Pages are requested only when the buffered results run out, so dropping
/// the pager at any point fetches nothing more. Documents are converted to
/// [`Node`]s one at a time as they are yielded. A failed fetch does not
/// advance the page; calling [`next`](Self::next) again retries it.
pub struct NodePager {
    store: Arc<dyn NodeStore>,
    query: StoreQuery,
    next_page: usize,
    buffer: VecDeque<NodeDocument>,
    fetched: usize,
    total: Option<usize>,
    exhausted: bool,
    pages_fetched: usize,
}

impl NodePager {
    pub(crate) fn new(store: Arc<dyn NodeStore>, query: StoreQuery) -> Self {
        Self {
            store,
            query,
            next_page: 1,
            buffer: VecDeque::new(),
            fetched: 0,
            total: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Pager that yields nothing and never queries the store
    pub(crate) fn empty(store: Arc<dyn NodeStore>, query: StoreQuery) -> Self {
        let mut pager = Self::new(store, query);
        pager.exhausted = true;
        pager.total = Some(0);
        pager
    }

    pub fn query(&self) -> &StoreQuery {
        &self.query
    }

    /// Total matches reported by the store, once the first page is in
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Pages requested since creation or the last restart
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Start over from the first page, discarding buffered results
    pub fn restart(&mut self) {
        let was_empty = self.total == Some(0) && self.pages_fetched == 0;
        self.next_page = 1;
        self.buffer.clear();
        self.fetched = 0;
        self.pages_fetched = 0;
        self.exhausted = was_empty;
        if !was_empty {
            self.total = None;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), NodeServiceError> {
        let page = self.store.query(&self.query, self.next_page).await?;

        self.pages_fetched += 1;
        self.next_page += 1;
        self.fetched += page.results.len();
        self.total = Some(page.result_count);
        if page.results.is_empty() || self.fetched >= page.result_count {
            self.exhausted = true;
        }

        tracing::debug!(
            page = self.next_page - 1,
            fetched = self.fetched,
            total = page.result_count,
            "Query page buffered"
        );

        self.buffer.extend(page.results);
        Ok(())
    }

    /// Next matching node, or `None` once every page has been consumed
    pub async fn next(&mut self) -> Option<Result<Node, NodeServiceError>> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Some(Node::from_document(doc).map_err(NodeServiceError::from));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page().await {
                return Some(Err(err));
            }
        }
    }

    /// The remaining results as a [`Stream`]
    ///
    /// Paging stays lazy: a page is requested only when the stream is polled
    /// past the buffered results. Errors are yielded as items and the stream
    /// keeps going, so polling again after a failed fetch retries it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Node, NodeServiceError>> + Send {
        stream::unfold(self, |mut pager| async move {
            let item = pager.next().await?;
            Some((item, pager))
        })
    }

    /// Drain the remaining results, stopping at the first error
    pub async fn try_collect(mut self) -> Result<Vec<Node>, NodeServiceError> {
        let mut nodes = Vec::new();
        while let Some(node) = self.next().await {
            nodes.push(node?);
        }
        Ok(nodes)
    }
}

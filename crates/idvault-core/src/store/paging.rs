//! Lazy pagination over Query and Scan.

use std::collections::VecDeque;

use idvault_model::{Item, QueryRequest, ScanRequest, StoreClient, StoreError};

enum PageSource {
    Query(QueryRequest),
    Scan(ScanRequest),
}

/// A lazy, single-pass sequence over a potentially paginated Query or
/// Scan. Pages are fetched transparently as the sequence is drained; the
/// suspension granularity is per page, not per item.
///
/// The sequence is not restartable. Callers needing a second pass
/// materialize it with [`ItemPager::collect_remaining`].
pub struct ItemPager<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    source: PageSource,
    buffer: VecDeque<Item>,
    continuation: Option<Item>,
    exhausted: bool,
}

impl<'a, C: StoreClient + ?Sized> ItemPager<'a, C> {
    /// Sequence over the pages of a query.
    pub fn query(client: &'a C, request: QueryRequest) -> Self {
        Self::new(client, PageSource::Query(request))
    }

    /// Sequence over the pages of a scan.
    pub fn scan(client: &'a C, request: ScanRequest) -> Self {
        Self::new(client, PageSource::Scan(request))
    }

    fn new(client: &'a C, source: PageSource) -> Self {
        Self {
            client,
            source,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
        }
    }

    /// The next item, fetching further pages as needed. `None` once the
    /// underlying operation is exhausted.
    pub async fn try_next(&mut self) -> Result<Option<Item>, StoreError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drains the rest of the sequence into a vector.
    pub async fn collect_remaining(mut self) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }

    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let page = match &self.source {
            PageSource::Query(request) => {
                let mut request = request.clone();
                request.exclusive_start_key = self.continuation.take();
                self.client.query(request).await?
            }
            PageSource::Scan(request) => {
                let mut request = request.clone();
                request.exclusive_start_key = self.continuation.take();
                self.client.scan(request).await?
            }
        };

        self.buffer.extend(page.items);
        match page.last_evaluated_key {
            Some(key) => self.continuation = Some(key),
            None => self.exhausted = true,
        }
        Ok(())
    }
}

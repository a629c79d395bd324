//! The narrow asynchronous contract a store provider implements.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::request::{
    DeleteItemRequest, GetItemRequest, Item, Page, PutItemRequest, QueryRequest, ScanRequest,
    TransactWriteItem, UpdateItemRequest,
};

/// Executes the store operations the data-access layer needs.
///
/// Implementations must be safe to invoke from many tasks concurrently;
/// every method is a suspension point. The data-access core sets no
/// timeouts of its own and propagates [`StoreError::Io`] unchanged.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Single-item point read. Returns `None` when the item does not exist.
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>, StoreError>;

    /// Partition-scoped query returning one page.
    async fn query(&self, request: QueryRequest) -> Result<Page, StoreError>;

    /// Full-table scan returning one page.
    async fn scan(&self, request: ScanRequest) -> Result<Page, StoreError>;

    /// Conditional single-item put.
    async fn put_item(&self, request: PutItemRequest) -> Result<(), StoreError>;

    /// Conditional single-item delete.
    async fn delete_item(&self, request: DeleteItemRequest) -> Result<(), StoreError>;

    /// Conditional single-item update.
    async fn update_item(&self, request: UpdateItemRequest) -> Result<(), StoreError>;

    /// All-or-nothing multi-item write. Each item carries its own condition;
    /// any failed condition cancels the whole transaction with per-item
    /// [`CancellationReason`](crate::CancellationReason)s.
    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<(), StoreError>;
}

//! Wire-level model types for the idvault data-access layer.
//!
//! This crate defines the narrow contract between the data-access core and
//! a DynamoDB-class wide-column store: the [`NativeValue`] attribute value
//! union with its single-key JSON encoding, the request/response types for
//! the store operations the core needs, and the store error surface.
#![allow(clippy::doc_markdown)]

pub mod client;
pub mod error;
pub mod request;
pub mod value;

pub use client::StoreClient;
pub use error::{CancellationReason, StoreError};
pub use request::{
    DeleteItemRequest, GetItemRequest, Item, Page, PutItemRequest, QueryRequest, ScanRequest,
    TransactWriteItem, UpdateItemRequest,
};
pub use value::NativeValue;

//! In-memory implementation of the idvault store contract.
//!
//! Single-partition-key tables with named secondary indexes, conditional
//! writes, all-or-nothing multi-item transactions, and paginated
//! Query/Scan, backed by [`DashMap`](dashmap::DashMap). Condition, filter,
//! and key-condition expression strings are parsed and evaluated against
//! items the same way the real store would, including `#name`/`:value`
//! placeholder substitution.
//!
//! This crate exists for tests: a `StoreClient` with real semantics and a
//! configurable page size so pagination paths get exercised.
#![allow(clippy::doc_markdown)]

pub mod expr;
mod store;

pub use store::{InMemoryStore, IndexSchema, TableSchema};

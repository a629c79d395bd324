//! Identity data-access layer over a DynamoDB-class wide-column store.
//!
//! Two subsystems carry the weight here:
//!
//! - The **fan-out protocol** for user accounts: a store with one natural
//!   unique key per item is made to enforce four independent unique
//!   constraints (accountId, userName, email, phone) by writing one item
//!   per constraint, all sharing a version counter, coordinated through
//!   multi-item transactions with per-item preconditions and a bounded
//!   optimistic-concurrency retry loop. See [`store::accounts`].
//! - The **filter-to-query planner**: SCIM filter expressions are
//!   normalized to disjunctive normal form, each product is matched to the
//!   cheapest index the table declares, and the result is either a set of
//!   partition queries with residual post-filters or a single gated table
//!   scan. See [`planner`].
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod error;
pub mod expression;
pub mod planner;
pub mod schema;
pub mod scim;
pub mod store;

pub use config::DapConfig;
pub use error::{DapError, DapResult};

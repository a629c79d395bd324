//! Store error surface.
//!
//! Failures coming back from the store client, normalized so the core can
//! tell optimistic-concurrency conflicts apart from everything else without
//! inspecting provider-specific exception types.

use thiserror::Error;

/// Per-item cancellation reason reported for a canceled transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationReason {
    /// The item's condition expression evaluated to false.
    ConditionalCheckFailed,
    /// The item was touched by a conflicting transaction.
    TransactionConflict,
    /// This item did not cause the cancellation.
    None,
    /// Any other provider-reported reason code.
    Other(String),
}

/// Errors surfaced by a store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A single-item write's condition expression evaluated to false.
    #[error("conditional check failed: {0}")]
    ConditionalCheckFailed(String),

    /// A multi-item transaction was canceled.
    #[error("transaction canceled: {message}")]
    TransactionCanceled {
        /// Provider message.
        message: String,
        /// One reason per transaction item, in request order.
        reasons: Vec<CancellationReason>,
    },

    /// The referenced table or index does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The request was malformed (bad expression, key type mismatch, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// An item could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport or provider failure; propagated unchanged by the core.
    #[error("store i/o error: {0}")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Returns `true` when the failure is a conditional-check failure,
    /// either on a single-item write or as any cancellation reason of a
    /// canceled transaction. This is the signal the optimistic-concurrency
    /// retry loop keys on.
    #[must_use]
    pub fn is_condition_failure(&self) -> bool {
        match self {
            Self::ConditionalCheckFailed(_) => true,
            Self::TransactionCanceled { reasons, .. } => reasons
                .iter()
                .any(|r| *r == CancellationReason::ConditionalCheckFailed),
            _ => false,
        }
    }
}

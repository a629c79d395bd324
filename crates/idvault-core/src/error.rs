//! Error taxonomy for the data-access layer.

use idvault_model::StoreError;

/// Errors surfaced by data-access operations.
///
/// The mapping policy: uniqueness and optimistic-concurrency failures
/// become [`DapError::Conflict`]; filters the planner cannot express fail
/// loudly instead of silently widening; anything else thrown by the store
/// client propagates unchanged through [`DapError::Store`].
#[derive(Debug, thiserror::Error)]
pub enum DapError {
    /// A uniqueness constraint or version precondition was violated and
    /// retries (where applicable) were exhausted.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A read item is missing a required attribute or carries one of the
    /// wrong type.
    #[error("schema error on attribute '{attribute}': {message}")]
    Schema {
        /// The offending attribute.
        attribute: String,
        /// Explanation.
        message: String,
    },

    /// The planner cannot express the filter against this table.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// The plan would need more distinct store queries than allowed.
    #[error("query requires too many operations")]
    QueryRequiresTooManyOperations,

    /// The plan requires a table scan and scans are disabled.
    #[error("query requires a table scan, which is disabled")]
    QueryRequiresTableScan,

    /// The attribute payload blob could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Store client failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DapError {
    /// Schema error for a missing required attribute.
    #[must_use]
    pub fn missing_attribute(attribute: &str) -> Self {
        Self::Schema {
            attribute: attribute.to_owned(),
            message: "required attribute is absent".to_owned(),
        }
    }
}

/// Convenience result type for data-access operations.
pub type DapResult<T> = Result<T, DapError>;

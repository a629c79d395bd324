//! SCIM-facing types: filter expressions, account attributes, patch
//! application, and resource queries.

pub mod attributes;
pub mod filter;

pub use attributes::{
    Account, AccountAttributes, AttributeUpdate, ResourceQuery, SubjectAttributes,
};
pub use filter::{CompareOp, Filter, FilterParseError, FilterValue};

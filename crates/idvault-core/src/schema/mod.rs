//! Table and attribute descriptors.
//!
//! Descriptors are `'static` constants; the planner compares them by
//! physical name. Each table module declares its attributes, its index
//! list (declaration order is the planner's tie-breaker), and the map from
//! logical SCIM paths to attributes.

pub mod accounts;
pub mod attribute;
pub mod delegations;
pub mod links;
pub mod table;

pub use attribute::{AttributeDescriptor, PhysicalType};
pub use table::{Index, IndexKey, TableDescriptor};

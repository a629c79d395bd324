//! The account-links table.
//!
//! A link connects a foreign account (`linkedAccountId` at
//! `linkedAccountDomainName`) to a local account. The partition key is the
//! composite `<linkedAccountId>@<linkedAccountDomainName>`; listing the
//! links of a local account goes through `list-links-index`.

use super::attribute::AttributeDescriptor;
use super::table::{Index, TableDescriptor};

/// Physical partition attribute: `<linkedAccountId>@<domain>`.
pub static PK: AttributeDescriptor = AttributeDescriptor::string("pk");
/// The foreign account identifier.
pub static LINKED_ACCOUNT_ID: AttributeDescriptor =
    AttributeDescriptor::string("linkedAccountId");
/// The domain the foreign account lives in.
pub static LINKED_ACCOUNT_DOMAIN: AttributeDescriptor =
    AttributeDescriptor::string("linkedAccountDomainName");
/// The local account the link points at.
pub static LOCAL_ACCOUNT_ID: AttributeDescriptor = AttributeDescriptor::string("accountId");
/// The account manager that created the link.
pub static LINKING_ACCOUNT_MANAGER: AttributeDescriptor =
    AttributeDescriptor::string("linkingAccountManager");
/// Creation time, epoch seconds.
pub static CREATED: AttributeDescriptor = AttributeDescriptor::number("created");

static INDEXES: [Index; 1] = [Index::partition_sort(
    "list-links-index",
    &LOCAL_ACCOUNT_ID,
    &LINKING_ACCOUNT_MANAGER,
)];

static ATTRIBUTE_MAP: [(&str, &AttributeDescriptor); 2] = [
    ("accountId", &LOCAL_ACCOUNT_ID),
    ("linkingAccountManager", &LINKING_ACCOUNT_MANAGER),
];

/// The links table descriptor.
pub static TABLE: TableDescriptor =
    TableDescriptor::new("curity-links", &PK, &INDEXES, &ATTRIBUTE_MAP);

/// Builds the composite partition-key value for a link.
#[must_use]
pub fn link_pk(linked_account_id: &str, linked_account_domain: &str) -> String {
    format!("{linked_account_id}@{linked_account_domain}")
}

//! The OAuth delegations table.
//!
//! Delegations are keyed by `id` directly; three secondary indexes cover
//! the common lookups (by owner, by client, by authorization code hash).
//! The table mainly exists to exercise the planner against a multi-index
//! layout without fan-out.

use super::attribute::AttributeDescriptor;
use super::table::{Index, TableDescriptor};

/// Delegation identifier, the partition key.
pub static ID: AttributeDescriptor = AttributeDescriptor::string("id");
/// Delegation status (`issued`, `revoked`).
pub static STATUS: AttributeDescriptor = AttributeDescriptor::string("status");
/// The subject that granted the delegation.
pub static OWNER: AttributeDescriptor = AttributeDescriptor::string("owner");
/// The OAuth client the delegation was granted to.
pub static CLIENT_ID: AttributeDescriptor = AttributeDescriptor::string("clientId");
/// Hash of the authorization code, when one was issued.
pub static AUTHORIZATION_CODE_HASH: AttributeDescriptor =
    AttributeDescriptor::string("authorizationCodeHash");
/// Expiry time, epoch seconds.
pub static EXPIRES: AttributeDescriptor = AttributeDescriptor::number("expires").sortable();
/// Redirect URI of the authorization request. Not indexed.
pub static REDIRECT_URI: AttributeDescriptor = AttributeDescriptor::string("redirectUri");
/// Serialized authentication attributes.
pub static AUTHENTICATION: AttributeDescriptor = AttributeDescriptor::string("authentication");
/// Serialized consent decisions.
pub static CONSENT: AttributeDescriptor = AttributeDescriptor::string("consent");
/// Serialized claim values.
pub static CLAIMS: AttributeDescriptor = AttributeDescriptor::string("claims");

static INDEXES: [Index; 4] = [
    Index::primary(&ID),
    Index::partition_sort("owner-status-index", &OWNER, &STATUS),
    Index::partition_sort("clientId-status-index", &CLIENT_ID, &STATUS),
    Index::partition("authorization-hash-index", &AUTHORIZATION_CODE_HASH),
];

static ATTRIBUTE_MAP: [(&str, &AttributeDescriptor); 9] = [
    ("id", &ID),
    ("status", &STATUS),
    ("owner", &OWNER),
    ("client_id", &CLIENT_ID),
    ("clientId", &CLIENT_ID),
    ("authorization_code_hash", &AUTHORIZATION_CODE_HASH),
    ("expires", &EXPIRES),
    ("redirect_uri", &REDIRECT_URI),
    ("redirectUri", &REDIRECT_URI),
];

/// The delegations table descriptor.
pub static TABLE: TableDescriptor =
    TableDescriptor::new("curity-delegations", &ID, &INDEXES, &ATTRIBUTE_MAP);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_order_indexes_for_tie_breaking() {
        let names: Vec<_> = TABLE.indexes().iter().map(Index::name).collect();
        assert_eq!(
            names,
            vec![
                None,
                Some("owner-status-index"),
                Some("clientId-status-index"),
                Some("authorization-hash-index"),
            ]
        );
    }

    #[test]
    fn test_should_not_index_redirect_uri() {
        let attr = TABLE.attribute("redirect_uri").unwrap();
        assert!(TABLE
            .indexes()
            .iter()
            .all(|i| i.partition_term_attribute() != attr && i.sort_attribute() != Some(attr)));
    }
}

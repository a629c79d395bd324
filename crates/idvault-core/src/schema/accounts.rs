//! The accounts table.
//!
//! One logical account fans out into up to four physical items sharing a
//! payload and a version counter, one per unique attribute namespace:
//!
//! ```text
//! ai#<accountId>   main item
//! un#<userName>    always present
//! em#<email>       present iff email set
//! pn#<phone>       present iff phone set
//! ```
//!
//! The four primary-key indexes below let the planner treat equality on
//! any unique attribute as an indexable point lookup.

use super::attribute::AttributeDescriptor;
use super::table::{Index, TableDescriptor};

/// Physical partition attribute.
pub static PK: AttributeDescriptor = AttributeDescriptor::string("pk");
/// Opaque account identifier, main-item namespace.
pub static ACCOUNT_ID: AttributeDescriptor =
    AttributeDescriptor::string("accountId").unique("ai#");
/// Unique user name.
pub static USER_NAME: AttributeDescriptor =
    AttributeDescriptor::string("userName").unique("un#").sortable();
/// Unique email, optional.
pub static EMAIL: AttributeDescriptor =
    AttributeDescriptor::string("email").unique("em#").sortable();
/// Unique phone number, optional.
pub static PHONE: AttributeDescriptor = AttributeDescriptor::string("phone").unique("pn#");
/// Opaque password hash; never returned by reads.
pub static PASSWORD: AttributeDescriptor = AttributeDescriptor::string("password");
/// Account active flag.
pub static ACTIVE: AttributeDescriptor = AttributeDescriptor::boolean("active");
/// Creation time, epoch seconds. Immutable after create.
pub static CREATED: AttributeDescriptor = AttributeDescriptor::number("created").sortable();
/// Last modification time, epoch seconds.
pub static UPDATED: AttributeDescriptor = AttributeDescriptor::number("updated").sortable();
/// Monotonic version counter shared by all fan-out items.
pub static VERSION: AttributeDescriptor = AttributeDescriptor::number("version");
/// The serialized SCIM attribute bag.
pub static ATTRIBUTES: AttributeDescriptor = AttributeDescriptor::string("attributes");

static INDEXES: [Index; 4] = [
    Index::primary(&ACCOUNT_ID),
    Index::primary(&USER_NAME),
    Index::primary(&EMAIL),
    Index::primary(&PHONE),
];

static ATTRIBUTE_MAP: [(&str, &AttributeDescriptor); 10] = [
    ("id", &ACCOUNT_ID),
    ("userName", &USER_NAME),
    ("emails", &EMAIL),
    ("emails.value", &EMAIL),
    ("phoneNumbers", &PHONE),
    ("phoneNumbers.value", &PHONE),
    ("active", &ACTIVE),
    ("meta.created", &CREATED),
    ("meta.lastModified", &UPDATED),
    ("meta.version", &VERSION),
];

/// The accounts table descriptor.
pub static TABLE: TableDescriptor =
    TableDescriptor::new("curity-accounts", &PK, &INDEXES, &ATTRIBUTE_MAP);

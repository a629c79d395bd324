//! Account attribute types and SCIM patch application.

use serde_json::{Map, Value};

use super::filter::Filter;

/// Caller-supplied account attributes for create/update.
///
/// The well-known fields are first-class; everything else a SCIM client
/// sends rides in `extra` and is persisted as one serialized blob.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountAttributes {
    /// Unique user name, required.
    pub user_name: String,
    /// Unique email, optional.
    pub email: Option<String>,
    /// Unique phone number, optional.
    pub phone: Option<String>,
    /// Opaque password hash. Ignored by `update`/`patch`; set through
    /// `update_password`.
    pub password: Option<String>,
    /// Whether the account is active.
    pub active: bool,
    /// The open SCIM attribute bag.
    pub extra: Map<String, Value>,
}

impl AccountAttributes {
    /// Attributes for an active account with the given user name.
    #[must_use]
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            active: true,
            ..Self::default()
        }
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the password hash.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Add an entry to the open attribute bag.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A persisted account as returned by reads. The password hash is never
/// part of this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Server-assigned opaque identifier.
    pub account_id: String,
    /// Unique user name.
    pub user_name: String,
    /// Unique email, if set.
    pub email: Option<String>,
    /// Unique phone number, if set.
    pub phone: Option<String>,
    /// Whether the account is active.
    pub active: bool,
    /// Creation time, epoch seconds. Immutable.
    pub created: i64,
    /// Last modification time, epoch seconds.
    pub updated: i64,
    /// Version counter shared by all of the account's items.
    pub version: u64,
    /// The open SCIM attribute bag.
    pub extra: Map<String, Value>,
}

impl Account {
    /// The caller-facing attribute view of this account (no password).
    #[must_use]
    pub fn attributes(&self) -> AccountAttributes {
        AccountAttributes {
            user_name: self.user_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            password: None,
            active: self.active,
            extra: self.extra.clone(),
        }
    }
}

/// The projection returned by `verify_password`: enough for the caller to
/// run its own credential check.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAttributes {
    /// The account identifier.
    pub account_id: String,
    /// The user name the lookup matched.
    pub user_name: String,
    /// The stored password hash, if one is set.
    pub password: Option<String>,
}

/// A SCIM-style attribute patch: additions, replacements, and removals
/// applied onto the observed attributes.
#[derive(Debug, Clone, Default)]
pub struct AttributeUpdate {
    /// Attributes to add.
    pub additions: Map<String, Value>,
    /// Attributes to replace.
    pub replacements: Map<String, Value>,
    /// Attribute names to remove.
    pub removals: Vec<String>,
}

impl AttributeUpdate {
    /// Record an addition.
    #[must_use]
    pub fn add(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additions.insert(key.into(), value);
        self
    }

    /// Record a replacement.
    #[must_use]
    pub fn replace(mut self, key: impl Into<String>, value: Value) -> Self {
        self.replacements.insert(key.into(), value);
        self
    }

    /// Record a removal.
    #[must_use]
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.removals.push(key.into());
        self
    }

    /// Applies the patch onto observed attributes.
    ///
    /// Field-level `password` changes are silently ignored (password
    /// changes go through `update_password`), `userName` cannot be
    /// removed, and the observed password rides through untouched.
    #[must_use]
    pub fn apply(&self, base: &AccountAttributes) -> AccountAttributes {
        let mut bag = to_bag(base);

        for (key, value) in self.additions.iter().chain(self.replacements.iter()) {
            if key == "password" {
                continue;
            }
            bag.insert(key.clone(), value.clone());
        }
        for key in &self.removals {
            if key == "password" || key == "userName" {
                continue;
            }
            bag.remove(key);
        }

        from_bag(bag, base)
    }
}

fn to_bag(attrs: &AccountAttributes) -> Map<String, Value> {
    let mut bag = attrs.extra.clone();
    bag.insert("userName".to_owned(), Value::String(attrs.user_name.clone()));
    if let Some(email) = &attrs.email {
        bag.insert("email".to_owned(), Value::String(email.clone()));
    }
    if let Some(phone) = &attrs.phone {
        bag.insert("phone".to_owned(), Value::String(phone.clone()));
    }
    bag.insert("active".to_owned(), Value::Bool(attrs.active));
    bag
}

fn from_bag(mut bag: Map<String, Value>, base: &AccountAttributes) -> AccountAttributes {
    let user_name = match bag.remove("userName") {
        Some(Value::String(s)) => s,
        _ => base.user_name.clone(),
    };
    let email = match bag.remove("email") {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let phone = match bag.remove("phone") {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let active = match bag.remove("active") {
        Some(Value::Bool(b)) => b,
        _ => true,
    };

    AccountAttributes {
        user_name,
        email,
        phone,
        password: base.password.clone(),
        active,
        extra: bag,
    }
}

/// A paged, optionally filtered and sorted resource listing request.
#[derive(Debug, Clone, Default)]
pub struct ResourceQuery {
    /// Filter to apply; absent means "all resources" (a gated scan).
    pub filter: Option<Filter>,
    /// Logical path of the attribute to sort by.
    pub sort_by: Option<String>,
    /// Sort direction; `false` for descending.
    pub descending: bool,
    /// Number of leading results to drop.
    pub start_index: usize,
    /// Maximum number of results to return; absent means all.
    pub count: Option<usize>,
    /// When non-empty, restrict the open attribute bag of each result to
    /// these keys.
    pub attributes: Vec<String>,
}

impl ResourceQuery {
    /// Query matching the given filter.
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

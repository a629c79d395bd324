//! Typed attribute descriptors.

use std::cmp::Ordering;

use idvault_model::NativeValue;

use crate::error::{DapError, DapResult};
use crate::scim::filter::FilterValue;

/// Physical type of an attribute as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalType {
    /// Stored as `S`.
    String,
    /// Stored as `N` (string-encoded decimal).
    Number,
    /// Stored as `BOOL`.
    Boolean,
}

impl PhysicalType {
    /// Wire descriptor for error messages.
    #[must_use]
    pub fn descriptor(self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
            Self::Boolean => "BOOL",
        }
    }
}

/// An immutable attribute descriptor.
///
/// Unique attributes carry a short prefix used to build partition-key
/// values (`un#<userName>`); attributes whitelisted as result sort keys
/// are marked `sortable`.
#[derive(Debug)]
pub struct AttributeDescriptor {
    name: &'static str,
    physical_type: PhysicalType,
    unique_prefix: Option<&'static str>,
    sortable: bool,
}

impl AttributeDescriptor {
    /// String attribute.
    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self {
            name,
            physical_type: PhysicalType::String,
            unique_prefix: None,
            sortable: false,
        }
    }

    /// Number attribute.
    #[must_use]
    pub const fn number(name: &'static str) -> Self {
        Self {
            name,
            physical_type: PhysicalType::Number,
            unique_prefix: None,
            sortable: false,
        }
    }

    /// Boolean attribute.
    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            physical_type: PhysicalType::Boolean,
            unique_prefix: None,
            sortable: false,
        }
    }

    /// Mark this attribute unique, with the pk namespace prefix.
    #[must_use]
    pub const fn unique(mut self, prefix: &'static str) -> Self {
        self.unique_prefix = Some(prefix);
        self
    }

    /// Whitelist this attribute as a result sort key.
    #[must_use]
    pub const fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Physical column name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Expression attribute name placeholder (`#name`).
    #[must_use]
    pub fn hash_name(&self) -> String {
        format!("#{}", self.name)
    }

    /// Expression attribute value placeholder stem (`:name`).
    #[must_use]
    pub fn colon_name(&self) -> String {
        format!(":{}", self.name)
    }

    /// Physical type.
    #[must_use]
    pub fn physical_type(&self) -> PhysicalType {
        self.physical_type
    }

    /// The uniqueness prefix, for unique attributes.
    #[must_use]
    pub fn unique_prefix(&self) -> Option<&'static str> {
        self.unique_prefix
    }

    /// Whether this attribute may sort a result set.
    #[must_use]
    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    /// Builds the prefix-tagged pk value for a unique attribute
    /// (`un#<value>`). `None` for non-unique attributes.
    #[must_use]
    pub fn uniqueness_value(&self, value: &str) -> Option<String> {
        self.unique_prefix.map(|p| format!("{p}{value}"))
    }

    /// Encodes a filter literal, validating it against the physical type.
    pub fn encode(&self, value: &FilterValue) -> DapResult<NativeValue> {
        match (self.physical_type, value) {
            (PhysicalType::String, FilterValue::Str(s)) => Ok(NativeValue::S(s.clone())),
            (PhysicalType::Number, FilterValue::Number(n)) => Ok(NativeValue::N(n.clone())),
            (PhysicalType::Boolean, FilterValue::Bool(b)) => Ok(NativeValue::Bool(*b)),
            (expected, got) => Err(DapError::UnsupportedQuery(format!(
                "attribute '{}' expects a {} value, got {}",
                self.name,
                expected.descriptor(),
                got.kind(),
            ))),
        }
    }

    /// Total order over stored values of this attribute: numeric for
    /// numbers, byte order for strings, `false < true` for booleans.
    /// Values of the wrong variant order before well-typed ones.
    #[must_use]
    pub fn compare(&self, a: &NativeValue, b: &NativeValue) -> Ordering {
        match self.physical_type {
            PhysicalType::String => match (a.as_s(), b.as_s()) {
                (Some(x), Some(y)) => x.as_bytes().cmp(y.as_bytes()),
                (x, y) => x.is_some().cmp(&y.is_some()),
            },
            PhysicalType::Number => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (x, y) => x.is_some().cmp(&y.is_some()),
            },
            PhysicalType::Boolean => match (a.as_bool(), b.as_bool()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (x, y) => x.is_some().cmp(&y.is_some()),
            },
        }
    }
}

impl PartialEq for AttributeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AttributeDescriptor {}

impl std::hash::Hash for AttributeDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

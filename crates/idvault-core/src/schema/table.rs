//! Table descriptors and index declarations.

use idvault_model::NativeValue;

use super::attribute::AttributeDescriptor;

/// The key shape of an index.
#[derive(Debug)]
pub enum IndexKey {
    /// Synthesized primary-key index over a unique attribute: equality on
    /// `via` executes as a key condition on the table's physical partition
    /// attribute with the prefix-tagged value (`un#<userName>`).
    Primary {
        /// The unique attribute this index is reached through.
        via: &'static AttributeDescriptor,
    },
    /// Partition-only secondary index.
    Partition {
        /// The index partition attribute.
        partition: &'static AttributeDescriptor,
    },
    /// Partition-and-sort secondary index.
    PartitionSort {
        /// The index partition attribute.
        partition: &'static AttributeDescriptor,
        /// The index sort attribute.
        sort: &'static AttributeDescriptor,
    },
}

/// A declared index. Declaration order within a table breaks planner ties.
#[derive(Debug)]
pub struct Index {
    name: Option<&'static str>,
    key: IndexKey,
}

impl Index {
    /// Synthesized primary-key index over a unique attribute.
    #[must_use]
    pub const fn primary(via: &'static AttributeDescriptor) -> Self {
        Self {
            name: None,
            key: IndexKey::Primary { via },
        }
    }

    /// Named partition-only secondary index.
    #[must_use]
    pub const fn partition(name: &'static str, partition: &'static AttributeDescriptor) -> Self {
        Self {
            name: Some(name),
            key: IndexKey::Partition { partition },
        }
    }

    /// Named partition-and-sort secondary index.
    #[must_use]
    pub const fn partition_sort(
        name: &'static str,
        partition: &'static AttributeDescriptor,
        sort: &'static AttributeDescriptor,
    ) -> Self {
        Self {
            name: Some(name),
            key: IndexKey::PartitionSort { partition, sort },
        }
    }

    /// The store-side index name; `None` for primary-key indexes.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// The attribute that must appear with `=` for this index to apply.
    #[must_use]
    pub fn partition_term_attribute(&self) -> &'static AttributeDescriptor {
        match &self.key {
            IndexKey::Primary { via } => via,
            IndexKey::Partition { partition } | IndexKey::PartitionSort { partition, .. } => {
                partition
            }
        }
    }

    /// The sort attribute, if this index has one.
    #[must_use]
    pub fn sort_attribute(&self) -> Option<&'static AttributeDescriptor> {
        match &self.key {
            IndexKey::PartitionSort { sort, .. } => Some(sort),
            _ => None,
        }
    }

    /// Whether equality on this index routes through the physical
    /// partition attribute with a prefix-tagged value.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self.key, IndexKey::Primary { .. })
    }
}

/// A table: physical name, partition attribute, declared indexes, and the
/// map from logical SCIM paths to attributes.
#[derive(Debug)]
pub struct TableDescriptor {
    physical_name: &'static str,
    partition_attribute: &'static AttributeDescriptor,
    indexes: &'static [Index],
    attribute_map: &'static [(&'static str, &'static AttributeDescriptor)],
}

impl TableDescriptor {
    /// Declare a table.
    #[must_use]
    pub const fn new(
        physical_name: &'static str,
        partition_attribute: &'static AttributeDescriptor,
        indexes: &'static [Index],
        attribute_map: &'static [(&'static str, &'static AttributeDescriptor)],
    ) -> Self {
        Self {
            physical_name,
            partition_attribute,
            indexes,
            attribute_map,
        }
    }

    /// The store-side table name.
    #[must_use]
    pub fn physical_name(&self) -> &'static str {
        self.physical_name
    }

    /// The physical partition attribute (`pk` for fan-out tables).
    #[must_use]
    pub fn partition_attribute(&self) -> &'static AttributeDescriptor {
        self.partition_attribute
    }

    /// Declared indexes, in planner tie-break order.
    #[must_use]
    pub fn indexes(&self) -> &'static [Index] {
        self.indexes
    }

    /// Resolves a logical SCIM path to an attribute descriptor.
    #[must_use]
    pub fn attribute(&self, path: &str) -> Option<&'static AttributeDescriptor> {
        self.attribute_map
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, attr)| *attr)
    }

    /// The partition-key value an index lookup uses for an equality term.
    ///
    /// For a primary-key index the term value is prefix-tagged into the
    /// physical partition attribute's namespace; for secondary indexes the
    /// term value passes through unchanged.
    #[must_use]
    pub fn partition_key_value(&self, index: &Index, term_value: &NativeValue) -> NativeValue {
        if index.is_primary() {
            let via = index.partition_term_attribute();
            let raw = term_value.as_s().unwrap_or_default();
            match via.uniqueness_value(raw) {
                Some(tagged) => NativeValue::S(tagged),
                None => term_value.clone(),
            }
        } else {
            term_value.clone()
        }
    }

    /// The attribute the emitted key condition names for an index.
    #[must_use]
    pub fn partition_key_attribute(&self, index: &Index) -> &'static AttributeDescriptor {
        if index.is_primary() {
            self.partition_attribute
        } else {
            index.partition_term_attribute()
        }
    }
}

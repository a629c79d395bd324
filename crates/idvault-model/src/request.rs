//! Request and page types for the store contract.
//!
//! These structs mirror the DynamoDB API subset the data-access layer
//! needs. Field naming follows the wire protocol's `PascalCase` JSON form
//! so a provider backed by the real service can pass them through
//! untouched; empty maps and `None` fields are omitted from the payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::NativeValue;

/// A stored item: attribute name to value.
pub type Item = HashMap<String, NativeValue>;

/// Input for a single-item point read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemRequest {
    /// The table holding the item.
    pub table_name: String,

    /// The full primary key of the item.
    pub key: Item,

    /// Request a strongly-consistent read.
    #[serde(default)]
    pub consistent_read: bool,

    /// Attributes to retrieve; all attributes when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,

    /// Substitution tokens for attribute names in the projection.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
}

impl GetItemRequest {
    /// Point read of `key` in `table`.
    #[must_use]
    pub fn new(table: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table.into(),
            key,
            ..Self::default()
        }
    }
}

/// Input for a partition-scoped query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryRequest {
    /// The table to query.
    pub table_name: String,

    /// Secondary index to query; the base table when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,

    /// Partition equality plus optional sort-key range.
    pub key_condition_expression: String,

    /// Post-read filter applied by the store before returning the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,

    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, NativeValue>,

    /// Maximum number of items the store evaluates per page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Continuation key from the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_start_key: Option<Item>,
}

/// Input for a full-table scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanRequest {
    /// The table to scan.
    pub table_name: String,

    /// Post-read filter applied by the store before returning the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,

    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, NativeValue>,

    /// Continuation key from the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_start_key: Option<Item>,
}

/// One page of query or scan results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page {
    /// Items in store order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,

    /// Continuation key; `Some` when the result was truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<Item>,
}

/// Input for a conditional single-item put.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutItemRequest {
    /// The target table.
    pub table_name: String,

    /// The full item to write.
    pub item: Item,

    /// Condition that must hold on the current item state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,

    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, NativeValue>,
}

/// Input for a conditional single-item delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteItemRequest {
    /// The target table.
    pub table_name: String,

    /// The full primary key of the item.
    pub key: Item,

    /// Condition that must hold on the current item state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,

    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, NativeValue>,
}

/// Input for a conditional single-item update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItemRequest {
    /// The target table.
    pub table_name: String,

    /// The full primary key of the item.
    pub key: Item,

    /// SET/REMOVE actions to apply.
    pub update_expression: String,

    /// Condition that must hold on the current item state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,

    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, NativeValue>,
}

/// One write in a multi-item transaction, with its own condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactWriteItem {
    /// Write a full item.
    Put(PutItemRequest),
    /// Remove an item.
    Delete(DeleteItemRequest),
    /// Apply an update expression to an item.
    Update(UpdateItemRequest),
}

impl TransactWriteItem {
    /// The table this write targets.
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::Put(p) => &p.table_name,
            Self::Delete(d) => &d.table_name,
            Self::Update(u) => &u.table_name,
        }
    }
}

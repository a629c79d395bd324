//! The in-memory store client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use idvault_model::{
    CancellationReason, DeleteItemRequest, GetItemRequest, Item, NativeValue, Page,
    PutItemRequest, QueryRequest, ScanRequest, StoreClient, StoreError, TransactWriteItem,
    UpdateItemRequest,
};

use crate::expr::{self, EvalContext};

/// A registered secondary index.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The store-side index name.
    pub name: String,
    /// The index partition attribute.
    pub partition_attribute: String,
    /// The index sort attribute, when the index has one.
    pub sort_attribute: Option<String>,
}

/// A registered table: one partition attribute, any number of indexes.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// The table name.
    pub name: String,
    /// The partition attribute.
    pub partition_attribute: String,
    /// Declared secondary indexes.
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// A table keyed by `partition_attribute`.
    #[must_use]
    pub fn new(name: impl Into<String>, partition_attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_attribute: partition_attribute.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn with_index(
        mut self,
        name: impl Into<String>,
        partition_attribute: impl Into<String>,
        sort_attribute: Option<&str>,
    ) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            partition_attribute: partition_attribute.into(),
            sort_attribute: sort_attribute.map(str::to_owned),
        });
        self
    }
}

struct TableData {
    schema: TableSchema,
    items: DashMap<NativeValue, Item>,
}

/// An in-memory [`StoreClient`] with real condition-expression semantics.
///
/// `page_size` caps the number of items per Query/Scan page so pagination
/// paths get exercised; the default is unpaginated.
pub struct InMemoryStore {
    tables: DashMap<String, Arc<TableData>>,
    page_size: Option<usize>,
    // Serializes writes so transactions check and apply atomically.
    write_lock: Mutex<()>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// An empty store with unpaginated reads.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            page_size: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Caps Query/Scan pages at `page_size` items.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Registers a table. Replaces any previous table of the same name.
    pub fn register_table(&self, schema: TableSchema) {
        let name = schema.name.clone();
        self.tables.insert(
            name,
            Arc::new(TableData {
                schema,
                items: DashMap::new(),
            }),
        );
    }

    /// Number of physical items in a table, for test assertions.
    #[must_use]
    pub fn item_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.items.len())
    }

    fn table(&self, name: &str) -> Result<Arc<TableData>, StoreError> {
        self.tables
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::ResourceNotFound(format!("table '{name}' not found")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn partition_key(schema: &TableSchema, item: &Item) -> Result<NativeValue, StoreError> {
    item.get(&schema.partition_attribute).cloned().ok_or_else(|| {
        StoreError::Validation(format!(
            "missing partition attribute '{}'",
            schema.partition_attribute
        ))
    })
}

fn expr_error(e: expr::ExprError) -> StoreError {
    StoreError::Validation(e.to_string())
}

/// Evaluates an optional condition expression against the current item
/// state (an empty item when absent).
fn condition_holds(
    condition: Option<&str>,
    names: &HashMap<String, String>,
    values: &HashMap<String, NativeValue>,
    current: Option<&Item>,
) -> Result<bool, StoreError> {
    let Some(condition) = condition else {
        return Ok(true);
    };
    let parsed = expr::parse_condition(condition).map_err(expr_error)?;
    let empty = Item::new();
    let ctx = EvalContext {
        item: current.unwrap_or(&empty),
        names,
        values,
    };
    ctx.evaluate(&parsed).map_err(expr_error)
}

/// Deterministic whole-table order: by the partition value's display form.
fn sorted_items(table: &TableData) -> Vec<(NativeValue, Item)> {
    let mut entries: Vec<(NativeValue, Item)> = table
        .items
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    entries.sort_by_key(|(key, _)| key.to_string());
    entries
}

/// Applies the exclusive start key and page cap, producing one page.
fn paginate(
    entries: Vec<(NativeValue, Item)>,
    schema: &TableSchema,
    exclusive_start_key: Option<&Item>,
    page_size: Option<usize>,
    limit: Option<u32>,
) -> Result<Page, StoreError> {
    let start_index = match exclusive_start_key {
        Some(key) => {
            let start = partition_key(schema, key)?;
            entries
                .iter()
                .position(|(k, _)| *k == start)
                .map_or(0, |i| i + 1)
        }
        None => 0,
    };

    let mut cap = page_size.unwrap_or(usize::MAX);
    if let Some(limit) = limit {
        cap = cap.min(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    let remaining = &entries[start_index.min(entries.len())..];
    let page: Vec<(NativeValue, Item)> = remaining.iter().take(cap).cloned().collect();
    let truncated = page.len() < remaining.len();

    let last_evaluated_key = if truncated {
        page.last().map(|(key, _)| {
            let mut cursor = Item::new();
            cursor.insert(schema.partition_attribute.clone(), key.clone());
            cursor
        })
    } else {
        None
    };

    Ok(Page {
        items: page.into_iter().map(|(_, item)| item).collect(),
        last_evaluated_key,
    })
}

/// Applies an optional projection: a comma-separated list of attribute
/// names or `#name` placeholders.
fn project(
    item: Item,
    projection: Option<&str>,
    names: &HashMap<String, String>,
) -> Result<Item, StoreError> {
    let Some(projection) = projection else {
        return Ok(item);
    };

    let mut keep: Vec<&str> = Vec::new();
    for part in projection.split(',') {
        let part = part.trim();
        if let Some(placeholder) = part.strip_prefix('#') {
            let key = format!("#{placeholder}");
            let resolved = names.get(&key).ok_or_else(|| {
                StoreError::Validation(format!("unresolved projection name {key}"))
            })?;
            keep.push(resolved);
        } else {
            keep.push(part);
        }
    }

    Ok(item
        .into_iter()
        .filter(|(name, _)| keep.contains(&name.as_str()))
        .collect())
}

// ---------------------------------------------------------------------------
// StoreClient implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>, StoreError> {
        let table = self.table(&request.table_name)?;
        let key = partition_key(&table.schema, &request.key)?;
        let Some(item) = table.items.get(&key).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        let projected = project(
            item,
            request.projection_expression.as_deref(),
            &request.expression_attribute_names,
        )?;
        Ok(Some(projected))
    }

    async fn query(&self, request: QueryRequest) -> Result<Page, StoreError> {
        let table = self.table(&request.table_name)?;

        // Resolve the index; the key condition expression itself carries
        // the partition equality, so only the sort attribute matters here.
        let index_sort: Option<String> = match &request.index_name {
            None => None,
            Some(name) => table
                .schema
                .indexes
                .iter()
                .find(|i| i.name == *name)
                .ok_or_else(|| StoreError::ResourceNotFound(format!("index '{name}' not found")))?
                .sort_attribute
                .clone(),
        };

        let key_condition =
            expr::parse_condition(&request.key_condition_expression).map_err(expr_error)?;
        let filter = request
            .filter_expression
            .as_deref()
            .map(expr::parse_condition)
            .transpose()
            .map_err(expr_error)?;

        let mut matching: Vec<(NativeValue, Item)> = Vec::new();
        for (key, item) in sorted_items(&table) {
            let ctx = EvalContext {
                item: &item,
                names: &request.expression_attribute_names,
                values: &request.expression_attribute_values,
            };
            if !ctx.evaluate(&key_condition).map_err(expr_error)? {
                continue;
            }
            if let Some(filter) = &filter {
                if !ctx.evaluate(filter).map_err(expr_error)? {
                    continue;
                }
            }
            matching.push((key, item));
        }

        // Order by the index sort attribute, then by key for determinism.
        if let Some(sort_attr) = &index_sort {
            matching.sort_by(|(key_a, a), (key_b, b)| {
                match (a.get(sort_attr), b.get(sort_attr)) {
                    (Some(x), Some(y)) => expr::value_ordering(x, y)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| key_a.to_string().cmp(&key_b.to_string())),
                    _ => key_a.to_string().cmp(&key_b.to_string()),
                }
            });
        }

        debug!(
            table = %request.table_name,
            matches = matching.len(),
            "query evaluated"
        );
        paginate(
            matching,
            &table.schema,
            request.exclusive_start_key.as_ref(),
            self.page_size,
            request.limit,
        )
    }

    async fn scan(&self, request: ScanRequest) -> Result<Page, StoreError> {
        let table = self.table(&request.table_name)?;
        let filter = request
            .filter_expression
            .as_deref()
            .map(expr::parse_condition)
            .transpose()
            .map_err(expr_error)?;

        let mut matching: Vec<(NativeValue, Item)> = Vec::new();
        for (key, item) in sorted_items(&table) {
            if let Some(filter) = &filter {
                let ctx = EvalContext {
                    item: &item,
                    names: &request.expression_attribute_names,
                    values: &request.expression_attribute_values,
                };
                if !ctx.evaluate(filter).map_err(expr_error)? {
                    continue;
                }
            }
            matching.push((key, item));
        }

        paginate(
            matching,
            &table.schema,
            request.exclusive_start_key.as_ref(),
            self.page_size,
            None,
        )
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<(), StoreError> {
        let table = self.table(&request.table_name)?;
        let key = partition_key(&table.schema, &request.item)?;

        let guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = table.items.get(&key).map(|entry| entry.value().clone());
        if !condition_holds(
            request.condition_expression.as_deref(),
            &request.expression_attribute_names,
            &request.expression_attribute_values,
            current.as_ref(),
        )? {
            return Err(StoreError::ConditionalCheckFailed(
                "the conditional request failed".to_owned(),
            ));
        }
        table.items.insert(key, request.item);
        drop(guard);
        Ok(())
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<(), StoreError> {
        let table = self.table(&request.table_name)?;
        let key = partition_key(&table.schema, &request.key)?;

        let guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = table.items.get(&key).map(|entry| entry.value().clone());
        if !condition_holds(
            request.condition_expression.as_deref(),
            &request.expression_attribute_names,
            &request.expression_attribute_values,
            current.as_ref(),
        )? {
            return Err(StoreError::ConditionalCheckFailed(
                "the conditional request failed".to_owned(),
            ));
        }
        table.items.remove(&key);
        drop(guard);
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<(), StoreError> {
        let table = self.table(&request.table_name)?;
        let key = partition_key(&table.schema, &request.key)?;
        let actions = expr::parse_update(&request.update_expression).map_err(expr_error)?;

        let guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = table.items.get(&key).map(|entry| entry.value().clone());
        if !condition_holds(
            request.condition_expression.as_deref(),
            &request.expression_attribute_names,
            &request.expression_attribute_values,
            current.as_ref(),
        )? {
            return Err(StoreError::ConditionalCheckFailed(
                "the conditional request failed".to_owned(),
            ));
        }

        // Updating a missing item creates it from the key.
        let base = current.unwrap_or_else(|| request.key.clone());
        let ctx = EvalContext {
            item: &base,
            names: &request.expression_attribute_names,
            values: &request.expression_attribute_values,
        };
        let updated = ctx.apply_update(&actions).map_err(expr_error)?;
        table.items.insert(key, updated);
        drop(guard);
        Ok(())
    }

    async fn transact_write_items(
        &self,
        items: Vec<TransactWriteItem>,
    ) -> Result<(), StoreError> {
        let guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        // Phase one: evaluate every item's condition against current state.
        let mut reasons = Vec::with_capacity(items.len());
        let mut any_failed = false;
        for write in &items {
            let holds = match write {
                TransactWriteItem::Put(put) => {
                    let table = self.table(&put.table_name)?;
                    let key = partition_key(&table.schema, &put.item)?;
                    let current = table.items.get(&key).map(|entry| entry.value().clone());
                    condition_holds(
                        put.condition_expression.as_deref(),
                        &put.expression_attribute_names,
                        &put.expression_attribute_values,
                        current.as_ref(),
                    )?
                }
                TransactWriteItem::Delete(delete) => {
                    let table = self.table(&delete.table_name)?;
                    let key = partition_key(&table.schema, &delete.key)?;
                    let current = table.items.get(&key).map(|entry| entry.value().clone());
                    condition_holds(
                        delete.condition_expression.as_deref(),
                        &delete.expression_attribute_names,
                        &delete.expression_attribute_values,
                        current.as_ref(),
                    )?
                }
                TransactWriteItem::Update(update) => {
                    let table = self.table(&update.table_name)?;
                    let key = partition_key(&table.schema, &update.key)?;
                    let current = table.items.get(&key).map(|entry| entry.value().clone());
                    condition_holds(
                        update.condition_expression.as_deref(),
                        &update.expression_attribute_names,
                        &update.expression_attribute_values,
                        current.as_ref(),
                    )?
                }
            };
            if holds {
                reasons.push(CancellationReason::None);
            } else {
                reasons.push(CancellationReason::ConditionalCheckFailed);
                any_failed = true;
            }
        }

        if any_failed {
            return Err(StoreError::TransactionCanceled {
                message: "transaction canceled due to condition failure".to_owned(),
                reasons,
            });
        }

        // Phase two: apply all writes.
        for write in items {
            match write {
                TransactWriteItem::Put(put) => {
                    let table = self.table(&put.table_name)?;
                    let key = partition_key(&table.schema, &put.item)?;
                    table.items.insert(key, put.item);
                }
                TransactWriteItem::Delete(delete) => {
                    let table = self.table(&delete.table_name)?;
                    let key = partition_key(&table.schema, &delete.key)?;
                    table.items.remove(&key);
                }
                TransactWriteItem::Update(update) => {
                    let table = self.table(&update.table_name)?;
                    let key = partition_key(&table.schema, &update.key)?;
                    let actions =
                        expr::parse_update(&update.update_expression).map_err(expr_error)?;
                    let base = table
                        .items
                        .get(&key)
                        .map(|entry| entry.value().clone())
                        .unwrap_or_else(|| update.key.clone());
                    let ctx = EvalContext {
                        item: &base,
                        names: &update.expression_attribute_names,
                        values: &update.expression_attribute_values,
                    };
                    let updated = ctx.apply_update(&actions).map_err(expr_error)?;
                    table.items.insert(key, updated);
                }
            }
        }

        drop(guard);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.register_table(TableSchema::new("t", "pk"));
        store
    }

    fn item(pairs: &[(&str, NativeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_should_put_and_get_item() {
        let store = store_with_table();
        let it = item(&[
            ("pk", NativeValue::string("a")),
            ("name", NativeValue::string("Alice")),
        ]);
        store
            .put_item(PutItemRequest {
                table_name: "t".to_owned(),
                item: it.clone(),
                ..PutItemRequest::default()
            })
            .await
            .unwrap();

        let got = store
            .get_item(GetItemRequest::new(
                "t",
                item(&[("pk", NativeValue::string("a"))]),
            ))
            .await
            .unwrap();
        assert_eq!(got, Some(it));
    }

    #[tokio::test]
    async fn test_should_enforce_not_exists_condition() {
        let store = store_with_table();
        let put = PutItemRequest {
            table_name: "t".to_owned(),
            item: item(&[("pk", NativeValue::string("a"))]),
            condition_expression: Some("attribute_not_exists(pk)".to_owned()),
            ..PutItemRequest::default()
        };
        store.put_item(put.clone()).await.unwrap();

        let err = store.put_item(put).await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionalCheckFailed(_)));
    }

    #[tokio::test]
    async fn test_should_cancel_transaction_with_reasons() {
        let store = store_with_table();
        store
            .put_item(PutItemRequest {
                table_name: "t".to_owned(),
                item: item(&[("pk", NativeValue::string("taken"))]),
                ..PutItemRequest::default()
            })
            .await
            .unwrap();

        let writes = vec![
            TransactWriteItem::Put(PutItemRequest {
                table_name: "t".to_owned(),
                item: item(&[("pk", NativeValue::string("fresh"))]),
                condition_expression: Some("attribute_not_exists(pk)".to_owned()),
                ..PutItemRequest::default()
            }),
            TransactWriteItem::Put(PutItemRequest {
                table_name: "t".to_owned(),
                item: item(&[("pk", NativeValue::string("taken"))]),
                condition_expression: Some("attribute_not_exists(pk)".to_owned()),
                ..PutItemRequest::default()
            }),
        ];

        let err = store.transact_write_items(writes).await.unwrap_err();
        let StoreError::TransactionCanceled { reasons, .. } = &err else {
            panic!("expected cancellation");
        };
        assert_eq!(
            reasons,
            &vec![
                CancellationReason::None,
                CancellationReason::ConditionalCheckFailed,
            ]
        );
        assert!(err.is_condition_failure());

        // Nothing was applied.
        assert_eq!(store.item_count("t"), 1);
    }

    #[tokio::test]
    async fn test_should_paginate_scans() {
        let store = InMemoryStore::new().with_page_size(2);
        store.register_table(TableSchema::new("t", "pk"));
        for i in 0..5 {
            store
                .put_item(PutItemRequest {
                    table_name: "t".to_owned(),
                    item: item(&[("pk", NativeValue::string(format!("k{i}")))]),
                    ..PutItemRequest::default()
                })
                .await
                .unwrap();
        }

        let mut pages = 0;
        let mut total = 0;
        let mut start_key = None;
        loop {
            let page = store
                .scan(ScanRequest {
                    table_name: "t".to_owned(),
                    exclusive_start_key: start_key.take(),
                    ..ScanRequest::default()
                })
                .await
                .unwrap();
            pages += 1;
            total += page.items.len();
            match page.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }
        assert_eq!(total, 5);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_should_query_secondary_index_with_sort_order() {
        let store = InMemoryStore::new();
        store.register_table(
            TableSchema::new("d", "id").with_index("by-owner", "owner", Some("rank")),
        );
        for (id, owner, rank) in [("x", "u1", 3), ("y", "u1", 1), ("z", "u2", 2)] {
            store
                .put_item(PutItemRequest {
                    table_name: "d".to_owned(),
                    item: item(&[
                        ("id", NativeValue::string(id)),
                        ("owner", NativeValue::string(owner)),
                        ("rank", NativeValue::number(rank)),
                    ]),
                    ..PutItemRequest::default()
                })
                .await
                .unwrap();
        }

        let mut names = HashMap::new();
        names.insert("#owner".to_owned(), "owner".to_owned());
        let mut values = HashMap::new();
        values.insert(":owner_1".to_owned(), NativeValue::string("u1"));

        let page = store
            .query(QueryRequest {
                table_name: "d".to_owned(),
                index_name: Some("by-owner".to_owned()),
                key_condition_expression: "#owner = :owner_1".to_owned(),
                expression_attribute_names: names,
                expression_attribute_values: values,
                ..QueryRequest::default()
            })
            .await
            .unwrap();

        let ids: Vec<_> = page
            .items
            .iter()
            .filter_map(|i| i.get("id").and_then(NativeValue::as_s))
            .collect();
        // Sorted by rank: y (1) before x (3); z belongs to another owner.
        assert_eq!(ids, vec!["y", "x"]);
    }

    #[tokio::test]
    async fn test_should_apply_update_expression_under_condition() {
        let store = store_with_table();
        store
            .put_item(PutItemRequest {
                table_name: "t".to_owned(),
                item: item(&[
                    ("pk", NativeValue::string("a")),
                    ("status", NativeValue::string("issued")),
                ]),
                ..PutItemRequest::default()
            })
            .await
            .unwrap();

        let mut names = HashMap::new();
        names.insert("#status".to_owned(), "status".to_owned());
        let mut values = HashMap::new();
        values.insert(":status_1".to_owned(), NativeValue::string("revoked"));

        store
            .update_item(UpdateItemRequest {
                table_name: "t".to_owned(),
                key: item(&[("pk", NativeValue::string("a"))]),
                update_expression: "SET #status = :status_1".to_owned(),
                condition_expression: Some("attribute_exists(pk)".to_owned()),
                expression_attribute_names: names,
                expression_attribute_values: values,
            })
            .await
            .unwrap();

        let got = store
            .get_item(GetItemRequest::new(
                "t",
                item(&[("pk", NativeValue::string("a"))]),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.get("status"), Some(&NativeValue::string("revoked")));
    }

    #[tokio::test]
    async fn test_should_error_on_unknown_table() {
        let store = InMemoryStore::new();
        let err = store
            .get_item(GetItemRequest::new("missing", Item::new()))
            .await;
        assert!(matches!(err, Err(StoreError::ResourceNotFound(_))));
    }
}

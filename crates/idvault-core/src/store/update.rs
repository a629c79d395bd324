//! Transaction-write-set construction for account mutations.

use std::collections::HashMap;

use idvault_model::{
    DeleteItemRequest, Item, NativeValue, PutItemRequest, StoreError, TransactWriteItem,
};

use crate::error::{DapError, DapResult};
use crate::expression::ExpressionBuilder;
use crate::schema::accounts;
use crate::schema::attribute::AttributeDescriptor;

/// Renders the optimistic-concurrency precondition bound to the observed
/// state: `#version = :version_1 AND #accountId = :accountId_1`.
pub(crate) fn version_precondition(
    observed_version: u64,
    account_id: &str,
) -> (String, HashMap<String, String>, HashMap<String, NativeValue>) {
    let mut builder = ExpressionBuilder::new();
    let version_name = builder.name_ref(&accounts::VERSION);
    let version_value =
        builder.value_ref(&accounts::VERSION, NativeValue::number(observed_version));
    let id_name = builder.name_ref(&accounts::ACCOUNT_ID);
    let id_value = builder.value_ref(&accounts::ACCOUNT_ID, NativeValue::string(account_id));
    let expression = format!("{version_name} = {version_value} AND {id_name} = {id_value}");
    let (names, values) = builder.into_parts();
    (expression, names, values)
}

/// Builds the transaction-write set for one account mutation.
///
/// The builder is bound to the common payload (all attributes except `pk`)
/// and the observed `(version, accountId)` pair. Each unique attribute's
/// old/new values decide whether its secondary item is added, removed,
/// replaced, or moved; the main item is always replaced exactly once.
pub struct UpdateBuilder {
    common_item: Item,
    observed_version: u64,
    account_id: String,
    operations: Vec<TransactWriteItem>,
    main_replaced: bool,
}

impl UpdateBuilder {
    /// Binds a builder to the new payload and the observed state.
    #[must_use]
    pub fn new(common_item: Item, observed_version: u64, account_id: impl Into<String>) -> Self {
        Self {
            common_item,
            observed_version,
            account_id: account_id.into(),
            operations: Vec::new(),
            main_replaced: false,
        }
    }

    /// Appends the writes for one unique attribute's old/new pair:
    ///
    /// - both absent: nothing;
    /// - newly set: put under `attribute_not_exists(pk)`;
    /// - cleared: delete the old item under the version precondition;
    /// - unchanged: replace the item in place under the version
    ///   precondition;
    /// - changed: delete the old item (version precondition) and put the
    ///   new one (`attribute_not_exists(pk)`).
    pub fn handle_unique_attribute(
        &mut self,
        attr: &'static AttributeDescriptor,
        old: Option<&str>,
        new: Option<&str>,
    ) -> DapResult<()> {
        match (old, new) {
            (None, None) => Ok(()),
            (None, Some(new)) => {
                let pk = self.uniqueness_pk(attr, new)?;
                self.put_fresh(pk);
                Ok(())
            }
            (Some(old), None) => {
                let pk = self.uniqueness_pk(attr, old)?;
                self.delete_guarded(pk);
                Ok(())
            }
            (Some(old), Some(new)) if old == new => {
                let pk = self.uniqueness_pk(attr, old)?;
                self.put_guarded(pk);
                Ok(())
            }
            (Some(old), Some(new)) => {
                let old_pk = self.uniqueness_pk(attr, old)?;
                let new_pk = self.uniqueness_pk(attr, new)?;
                self.delete_guarded(old_pk);
                self.put_fresh(new_pk);
                Ok(())
            }
        }
    }

    /// Appends the main-item replace. Exactly one per transaction.
    pub fn replace_main(&mut self) -> DapResult<()> {
        if self.main_replaced {
            return Err(StoreError::Validation(
                "main item already replaced in this transaction".to_owned(),
            )
            .into());
        }
        let pk = self.uniqueness_pk(&accounts::ACCOUNT_ID, &self.account_id)?;
        self.put_guarded(pk);
        self.main_replaced = true;
        Ok(())
    }

    /// Appends the main-item delete, guarded by the version precondition.
    /// Account deletion uses this in place of [`UpdateBuilder::replace_main`].
    pub fn delete_main(&mut self) -> DapResult<()> {
        let pk = self.uniqueness_pk(&accounts::ACCOUNT_ID, &self.account_id)?;
        self.delete_guarded(pk);
        Ok(())
    }

    /// Finishes the builder, failing fast on an empty transaction.
    pub fn build(self) -> DapResult<Vec<TransactWriteItem>> {
        if self.operations.is_empty() {
            return Err(
                StoreError::Validation("transaction would contain no writes".to_owned()).into(),
            );
        }
        Ok(self.operations)
    }

    fn uniqueness_pk(&self, attr: &'static AttributeDescriptor, value: &str) -> DapResult<String> {
        attr.uniqueness_value(value).ok_or_else(|| DapError::Schema {
            attribute: attr.name().to_owned(),
            message: "attribute carries no uniqueness prefix".to_owned(),
        })
    }

    fn item_for(&self, pk: String) -> Item {
        let mut item = self.common_item.clone();
        item.insert(accounts::PK.name().to_owned(), NativeValue::S(pk));
        item
    }

    /// Put guarded by the version precondition (replace in place).
    fn put_guarded(&mut self, pk: String) {
        let (condition, names, values) =
            version_precondition(self.observed_version, &self.account_id);
        self.operations.push(TransactWriteItem::Put(PutItemRequest {
            table_name: accounts::TABLE.physical_name().to_owned(),
            item: self.item_for(pk),
            condition_expression: Some(condition),
            expression_attribute_names: names,
            expression_attribute_values: values,
        }));
    }

    /// Put guarded by `attribute_not_exists(pk)` (claim a fresh pk).
    fn put_fresh(&mut self, pk: String) {
        let mut builder = ExpressionBuilder::new();
        let condition = builder.not_exists(&accounts::PK);
        let (names, values) = builder.into_parts();
        self.operations.push(TransactWriteItem::Put(PutItemRequest {
            table_name: accounts::TABLE.physical_name().to_owned(),
            item: self.item_for(pk),
            condition_expression: Some(condition),
            expression_attribute_names: names,
            expression_attribute_values: values,
        }));
    }

    /// Delete guarded by the version precondition.
    fn delete_guarded(&mut self, pk: String) {
        let (condition, names, values) =
            version_precondition(self.observed_version, &self.account_id);
        let mut key = Item::new();
        key.insert(accounts::PK.name().to_owned(), NativeValue::S(pk));
        self.operations
            .push(TransactWriteItem::Delete(DeleteItemRequest {
                table_name: accounts::TABLE.physical_name().to_owned(),
                key,
                condition_expression: Some(condition),
                expression_attribute_names: names,
                expression_attribute_values: values,
            }));
    }
}

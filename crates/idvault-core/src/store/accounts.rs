//! The account store: fan-out uniqueness, versioned mutations, and
//! planner-driven listing.
//!
//! Every logical account is persisted as one main item (`ai#<accountId>`)
//! plus one secondary item per set unique attribute (`un#`, `em#`, `pn#`),
//! all carrying the full payload and the same version counter. Each
//! `get_by_*` is therefore a single strongly-consistent point read; each
//! mutation is one multi-item transaction whose per-item preconditions
//! enforce uniqueness and optimistic concurrency.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use idvault_model::{
    GetItemRequest, Item, NativeValue, PutItemRequest, StoreClient, TransactWriteItem,
};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::DapConfig;
use crate::error::{DapError, DapResult};
use crate::expression::ExpressionBuilder;
use crate::planner::{self, emit, residual, QueryPlan};
use crate::schema::accounts;
use crate::schema::attribute::AttributeDescriptor;
use crate::scim::attributes::{
    Account, AccountAttributes, AttributeUpdate, ResourceQuery, SubjectAttributes,
};
use crate::store::paging::ItemPager;
use crate::store::retry::{run_with_retries, TransactionAttemptResult};
use crate::store::update::UpdateBuilder;

/// Data-access operations for user accounts.
pub struct AccountStore<C> {
    client: Arc<C>,
    config: DapConfig,
}

impl<C: StoreClient> AccountStore<C> {
    /// A store over the given client.
    #[must_use]
    pub fn new(client: Arc<C>, config: DapConfig) -> Self {
        Self { client, config }
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Creates an account, enforcing uniqueness of userName, email, and
    /// phone atomically.
    ///
    /// # Errors
    ///
    /// [`DapError::Conflict`] when any fan-out pk already exists.
    pub async fn create(&self, attrs: &AccountAttributes) -> DapResult<Account> {
        let now = Utc::now().timestamp();
        let record = AccountRecord {
            account_id: Uuid::new_v4().to_string(),
            user_name: attrs.user_name.clone(),
            email: attrs.email.clone(),
            phone: attrs.phone.clone(),
            password: attrs.password.clone(),
            active: attrs.active,
            created: now,
            updated: now,
            version: 0,
            extra: attrs.extra.clone(),
        };

        let common = record.common_item()?;
        let operations: Vec<TransactWriteItem> = record
            .fanout_pks()
            .into_iter()
            .map(|pk| {
                let mut builder = ExpressionBuilder::new();
                let condition = builder.not_exists(&accounts::PK);
                let (names, values) = builder.into_parts();
                let mut item = common.clone();
                item.insert(accounts::PK.name().to_owned(), NativeValue::S(pk));
                TransactWriteItem::Put(PutItemRequest {
                    table_name: accounts::TABLE.physical_name().to_owned(),
                    item,
                    condition_expression: Some(condition),
                    expression_attribute_names: names,
                    expression_attribute_values: values,
                })
            })
            .collect();

        match self.client.transact_write_items(operations).await {
            Ok(()) => {
                debug!(account_id = %record.account_id, "created account");
                Ok(record.into_account())
            }
            Err(e) if e.is_condition_failure() => {
                Err(DapError::Conflict("uniqueness check failed".to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Point reads
    // -----------------------------------------------------------------------

    /// Strongly-consistent read by account id.
    pub async fn get_by_id(&self, account_id: &str) -> DapResult<Option<Account>> {
        self.get_by_unique(&accounts::ACCOUNT_ID, account_id).await
    }

    /// Strongly-consistent read by user name.
    pub async fn get_by_user_name(&self, user_name: &str) -> DapResult<Option<Account>> {
        self.get_by_unique(&accounts::USER_NAME, user_name).await
    }

    /// Strongly-consistent read by email.
    pub async fn get_by_email(&self, email: &str) -> DapResult<Option<Account>> {
        self.get_by_unique(&accounts::EMAIL, email).await
    }

    /// Strongly-consistent read by phone number.
    pub async fn get_by_phone(&self, phone: &str) -> DapResult<Option<Account>> {
        self.get_by_unique(&accounts::PHONE, phone).await
    }

    async fn get_by_unique(
        &self,
        attr: &'static AttributeDescriptor,
        value: &str,
    ) -> DapResult<Option<Account>> {
        Ok(self
            .read_record(attr, value)
            .await?
            .map(AccountRecord::into_account))
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Deletes an account and all of its fan-out items. Deleting an
    /// account that does not exist succeeds.
    pub async fn delete(&self, account_id: &str) -> DapResult<()> {
        run_with_retries(self.config.max_transaction_attempts, move || async move {
            let Some(observed) = self.read_record(&accounts::ACCOUNT_ID, account_id).await?
            else {
                return Ok(TransactionAttemptResult::Success(()));
            };

            // An empty payload: only the preconditions matter for deletes.
            let mut builder =
                UpdateBuilder::new(Item::new(), observed.version, &observed.account_id);
            builder.handle_unique_attribute(
                &accounts::USER_NAME,
                Some(&observed.user_name),
                None,
            )?;
            builder.handle_unique_attribute(&accounts::EMAIL, observed.email.as_deref(), None)?;
            builder.handle_unique_attribute(&accounts::PHONE, observed.phone.as_deref(), None)?;
            builder.delete_main()?;

            match self.client.transact_write_items(builder.build()?).await {
                Ok(()) => Ok(TransactionAttemptResult::Success(())),
                Err(e) if e.is_condition_failure() => Ok(TransactionAttemptResult::Failure(
                    DapError::Conflict("unable to delete".to_owned()),
                )),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Update / patch
    // -----------------------------------------------------------------------

    /// Replaces an account's attributes. The password and creation time
    /// are preserved; `version` increments by one on every fan-out item.
    /// Returns `None` without writing when the account does not exist.
    pub async fn update(
        &self,
        account_id: &str,
        new_attrs: &AccountAttributes,
    ) -> DapResult<Option<Account>> {
        run_with_retries(self.config.max_transaction_attempts, move || async move {
            let Some(observed) = self.read_record(&accounts::ACCOUNT_ID, account_id).await?
            else {
                return Ok(TransactionAttemptResult::Success(None));
            };
            self.attempt_replace(&observed, new_attrs).await
        })
        .await
    }

    /// Applies a SCIM attribute patch onto the observed attributes.
    /// Field-level password changes are silently ignored; use
    /// [`AccountStore::update_password`]. Returns `None` without writing
    /// when the account does not exist.
    pub async fn patch(
        &self,
        account_id: &str,
        update: &AttributeUpdate,
    ) -> DapResult<Option<Account>> {
        run_with_retries(self.config.max_transaction_attempts, move || async move {
            let Some(observed) = self.read_record(&accounts::ACCOUNT_ID, account_id).await?
            else {
                return Ok(TransactionAttemptResult::Success(None));
            };
            let patched = update.apply(&observed.caller_attributes());
            self.attempt_replace(&observed, &patched).await
        })
        .await
    }

    /// One update attempt against an observed record: diff the unique
    /// attributes, replace the main item, submit the transaction.
    async fn attempt_replace(
        &self,
        observed: &AccountRecord,
        new_attrs: &AccountAttributes,
    ) -> DapResult<TransactionAttemptResult<Option<Account>>> {
        let new_record = AccountRecord {
            account_id: observed.account_id.clone(),
            user_name: new_attrs.user_name.clone(),
            email: new_attrs.email.clone(),
            phone: new_attrs.phone.clone(),
            password: observed.password.clone(),
            active: new_attrs.active,
            created: observed.created,
            updated: Utc::now().timestamp(),
            version: observed.version + 1,
            extra: new_attrs.extra.clone(),
        };

        let mut builder = UpdateBuilder::new(
            new_record.common_item()?,
            observed.version,
            &observed.account_id,
        );
        builder.handle_unique_attribute(
            &accounts::USER_NAME,
            Some(&observed.user_name),
            Some(&new_record.user_name),
        )?;
        builder.handle_unique_attribute(
            &accounts::EMAIL,
            observed.email.as_deref(),
            new_record.email.as_deref(),
        )?;
        builder.handle_unique_attribute(
            &accounts::PHONE,
            observed.phone.as_deref(),
            new_record.phone.as_deref(),
        )?;
        builder.replace_main()?;

        match self.client.transact_write_items(builder.build()?).await {
            Ok(()) => Ok(TransactionAttemptResult::Success(Some(
                new_record.into_account(),
            ))),
            Err(e) if e.is_condition_failure() => Ok(TransactionAttemptResult::Failure(
                DapError::Conflict("unable to update account".to_owned()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Passwords
    // -----------------------------------------------------------------------

    /// Replaces the stored password hash on every fan-out item. A missing
    /// user name is a successful no-op.
    pub async fn update_password(&self, user_name: &str, new_password: &str) -> DapResult<()> {
        run_with_retries(self.config.max_transaction_attempts, move || async move {
            let Some(observed) = self.read_record(&accounts::USER_NAME, user_name).await? else {
                return Ok(TransactionAttemptResult::Success(()));
            };

            let mut new_record = observed.clone();
            new_record.password = Some(new_password.to_owned());
            new_record.version = observed.version + 1;
            new_record.updated = Utc::now().timestamp();

            let mut builder = UpdateBuilder::new(
                new_record.common_item()?,
                observed.version,
                &observed.account_id,
            );
            // Old equals new everywhere: every present item is replaced
            // in place under the version precondition.
            builder.handle_unique_attribute(
                &accounts::USER_NAME,
                Some(&observed.user_name),
                Some(&observed.user_name),
            )?;
            builder.handle_unique_attribute(
                &accounts::EMAIL,
                observed.email.as_deref(),
                observed.email.as_deref(),
            )?;
            builder.handle_unique_attribute(
                &accounts::PHONE,
                observed.phone.as_deref(),
                observed.phone.as_deref(),
            )?;
            builder.replace_main()?;

            match self.client.transact_write_items(builder.build()?).await {
                Ok(()) => Ok(TransactionAttemptResult::Success(())),
                Err(e) if e.is_condition_failure() => Ok(TransactionAttemptResult::Failure(
                    DapError::Conflict("unable to update password".to_owned()),
                )),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Fetches the subject attributes needed for a credential check. The
    /// caller verifies the password; this method only returns the stored
    /// hash, and only for existing, active accounts.
    pub async fn verify_password(
        &self,
        user_name: &str,
        _presented_password: &str,
    ) -> DapResult<Option<SubjectAttributes>> {
        let Some(pk) = accounts::USER_NAME.uniqueness_value(user_name) else {
            return Ok(None);
        };

        let mut builder = ExpressionBuilder::new();
        let projection = [
            &accounts::ACCOUNT_ID,
            &accounts::USER_NAME,
            &accounts::PASSWORD,
            &accounts::ACTIVE,
        ]
        .map(|attr| builder.name_ref(attr))
        .join(", ");
        let (names, _) = builder.into_parts();

        let mut key = Item::new();
        key.insert(accounts::PK.name().to_owned(), NativeValue::S(pk));
        let request = GetItemRequest {
            table_name: accounts::TABLE.physical_name().to_owned(),
            key,
            consistent_read: true,
            projection_expression: Some(projection),
            expression_attribute_names: names,
        };

        let Some(item) = self.client.get_item(request).await? else {
            return Ok(None);
        };

        let active = get_bool(&item, &accounts::ACTIVE)?;
        if !active {
            return Ok(None);
        }

        Ok(Some(SubjectAttributes {
            account_id: get_string(&item, &accounts::ACCOUNT_ID)?,
            user_name: get_string(&item, &accounts::USER_NAME)?,
            password: opt_string(&item, &accounts::PASSWORD),
        }))
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// Lists accounts matching a resource query: plan, execute, re-filter,
    /// deduplicate by accountId in first-seen order, sort, page, project.
    pub async fn get_all(&self, query: &ResourceQuery) -> DapResult<Vec<Account>> {
        let mut items: Vec<Item> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        match &query.filter {
            Some(filter) => match planner::plan(filter, &accounts::TABLE)? {
                QueryPlan::UsingQueries(queries) => {
                    for planned in &queries {
                        let request = emit::emit_query(&accounts::TABLE, planned);
                        let mut pager = ItemPager::query(self.client.as_ref(), request);
                        while let Some(item) = pager.try_next().await? {
                            if residual::any_product_holds(&planned.residuals, &item) {
                                push_unique(&mut items, &mut seen, item);
                            }
                        }
                    }
                }
                QueryPlan::UsingScan(dnf) => {
                    self.ensure_scans_allowed()?;
                    let request =
                        emit::emit_scan(&accounts::TABLE, &dnf, Some((&accounts::PK, "ai#")));
                    let mut pager = ItemPager::scan(self.client.as_ref(), request);
                    while let Some(item) = pager.try_next().await? {
                        if dnf.matches(&item) {
                            push_unique(&mut items, &mut seen, item);
                        }
                    }
                }
            },
            None => {
                self.ensure_scans_allowed()?;
                let request = emit::emit_scan(
                    &accounts::TABLE,
                    &planner::Dnf::default(),
                    Some((&accounts::PK, "ai#")),
                );
                let mut pager = ItemPager::scan(self.client.as_ref(), request);
                while let Some(item) = pager.try_next().await? {
                    push_unique(&mut items, &mut seen, item);
                }
            }
        }

        if let Some(path) = &query.sort_by {
            let attr = accounts::TABLE.attribute(path).ok_or_else(|| {
                DapError::UnsupportedQuery(format!("unknown sort attribute '{path}'"))
            })?;
            if !attr.is_sortable() {
                return Err(DapError::UnsupportedQuery(format!(
                    "attribute '{path}' cannot sort a result set"
                )));
            }
            sort_items(&mut items, attr);
            if query.descending {
                items.reverse();
            }
        }

        let mut result = Vec::new();
        let limit = query.count.unwrap_or(usize::MAX);
        for item in items.into_iter().skip(query.start_index).take(limit) {
            let mut account = AccountRecord::from_item(&item)?.into_account();
            if !query.attributes.is_empty() {
                account
                    .extra
                    .retain(|key, _| query.attributes.iter().any(|a| a == key));
            }
            result.push(account);
        }
        Ok(result)
    }

    fn ensure_scans_allowed(&self) -> DapResult<()> {
        if self.config.allow_table_scans {
            Ok(())
        } else {
            Err(DapError::QueryRequiresTableScan)
        }
    }

    async fn read_record(
        &self,
        attr: &'static AttributeDescriptor,
        value: &str,
    ) -> DapResult<Option<AccountRecord>> {
        let Some(pk) = attr.uniqueness_value(value) else {
            return Ok(None);
        };
        let mut key = Item::new();
        key.insert(accounts::PK.name().to_owned(), NativeValue::S(pk));

        let mut request = GetItemRequest::new(accounts::TABLE.physical_name(), key);
        request.consistent_read = true;

        match self.client.get_item(request).await? {
            Some(item) => Ok(Some(AccountRecord::from_item(&item)?)),
            None => Ok(None),
        }
    }
}

fn push_unique(items: &mut Vec<Item>, seen: &mut HashSet<String>, item: Item) {
    let Some(account_id) = item
        .get(accounts::ACCOUNT_ID.name())
        .and_then(NativeValue::as_s)
    else {
        return;
    };
    if seen.insert(account_id.to_owned()) {
        items.push(item);
    }
}

/// Stable sort by one attribute; items missing the attribute sort last.
fn sort_items(items: &mut [Item], attr: &'static AttributeDescriptor) {
    items.sort_by(|a, b| match (a.get(attr.name()), b.get(attr.name())) {
        (Some(x), Some(y)) => attr.compare(x, y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

// ---------------------------------------------------------------------------
// Record mapping
// ---------------------------------------------------------------------------

/// The full persisted state of one account, password included.
#[derive(Debug, Clone)]
struct AccountRecord {
    account_id: String,
    user_name: String,
    email: Option<String>,
    phone: Option<String>,
    password: Option<String>,
    active: bool,
    created: i64,
    updated: i64,
    version: u64,
    extra: Map<String, Value>,
}

impl AccountRecord {
    /// Every fan-out pk this record owns, main item first.
    fn fanout_pks(&self) -> Vec<String> {
        let mut pks = Vec::with_capacity(4);
        if let Some(pk) = accounts::ACCOUNT_ID.uniqueness_value(&self.account_id) {
            pks.push(pk);
        }
        if let Some(pk) = accounts::USER_NAME.uniqueness_value(&self.user_name) {
            pks.push(pk);
        }
        if let Some(email) = &self.email {
            if let Some(pk) = accounts::EMAIL.uniqueness_value(email) {
                pks.push(pk);
            }
        }
        if let Some(phone) = &self.phone {
            if let Some(pk) = accounts::PHONE.uniqueness_value(phone) {
                pks.push(pk);
            }
        }
        pks
    }

    /// The shared payload written to every fan-out item (everything but
    /// `pk`).
    fn common_item(&self) -> DapResult<Item> {
        let blob = serde_json::to_string(&self.extra)
            .map_err(|e| DapError::Serialization(e.to_string()))?;

        let mut item = Item::new();
        item.insert(
            accounts::ACCOUNT_ID.name().to_owned(),
            NativeValue::string(&self.account_id),
        );
        item.insert(
            accounts::USER_NAME.name().to_owned(),
            NativeValue::string(&self.user_name),
        );
        if let Some(email) = &self.email {
            item.insert(accounts::EMAIL.name().to_owned(), NativeValue::string(email));
        }
        if let Some(phone) = &self.phone {
            item.insert(accounts::PHONE.name().to_owned(), NativeValue::string(phone));
        }
        if let Some(password) = &self.password {
            item.insert(
                accounts::PASSWORD.name().to_owned(),
                NativeValue::string(password),
            );
        }
        item.insert(
            accounts::ACTIVE.name().to_owned(),
            NativeValue::Bool(self.active),
        );
        item.insert(
            accounts::CREATED.name().to_owned(),
            NativeValue::number(self.created),
        );
        item.insert(
            accounts::UPDATED.name().to_owned(),
            NativeValue::number(self.updated),
        );
        item.insert(
            accounts::VERSION.name().to_owned(),
            NativeValue::number(self.version),
        );
        item.insert(accounts::ATTRIBUTES.name().to_owned(), NativeValue::S(blob));
        Ok(item)
    }

    fn from_item(item: &Item) -> DapResult<Self> {
        let extra = match opt_string(item, &accounts::ATTRIBUTES) {
            Some(blob) => serde_json::from_str(&blob)
                .map_err(|e| DapError::Serialization(e.to_string()))?,
            None => Map::new(),
        };

        Ok(Self {
            account_id: get_string(item, &accounts::ACCOUNT_ID)?,
            user_name: get_string(item, &accounts::USER_NAME)?,
            email: opt_string(item, &accounts::EMAIL),
            phone: opt_string(item, &accounts::PHONE),
            password: opt_string(item, &accounts::PASSWORD),
            active: get_bool(item, &accounts::ACTIVE)?,
            created: get_number(item, &accounts::CREATED)?,
            updated: get_number(item, &accounts::UPDATED)?,
            version: u64::try_from(get_number(item, &accounts::VERSION)?).map_err(|_| {
                DapError::Schema {
                    attribute: accounts::VERSION.name().to_owned(),
                    message: "version must be non-negative".to_owned(),
                }
            })?,
            extra,
        })
    }

    /// The caller-facing attribute view, password included, for patching.
    fn caller_attributes(&self) -> AccountAttributes {
        AccountAttributes {
            user_name: self.user_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            password: self.password.clone(),
            active: self.active,
            extra: self.extra.clone(),
        }
    }

    fn into_account(self) -> Account {
        Account {
            account_id: self.account_id,
            user_name: self.user_name,
            email: self.email,
            phone: self.phone,
            active: self.active,
            created: self.created,
            updated: self.updated,
            version: self.version,
            extra: self.extra,
        }
    }
}

fn get_string(item: &Item, attr: &AttributeDescriptor) -> DapResult<String> {
    item.get(attr.name())
        .and_then(NativeValue::as_s)
        .map(str::to_owned)
        .ok_or_else(|| DapError::missing_attribute(attr.name()))
}

fn opt_string(item: &Item, attr: &AttributeDescriptor) -> Option<String> {
    item.get(attr.name())
        .and_then(NativeValue::as_s)
        .map(str::to_owned)
}

fn get_bool(item: &Item, attr: &AttributeDescriptor) -> DapResult<bool> {
    item.get(attr.name())
        .and_then(NativeValue::as_bool)
        .ok_or_else(|| DapError::missing_attribute(attr.name()))
}

fn get_number(item: &Item, attr: &AttributeDescriptor) -> DapResult<i64> {
    item.get(attr.name())
        .and_then(NativeValue::as_n)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| DapError::missing_attribute(attr.name()))
}

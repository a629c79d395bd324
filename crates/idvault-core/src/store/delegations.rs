//! The delegation store: planner-driven reads over a multi-index table.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use idvault_model::{
    GetItemRequest, Item, NativeValue, PutItemRequest, StoreClient, UpdateItemRequest,
};
use serde_json::Value;

use crate::config::DapConfig;
use crate::error::{DapError, DapResult};
use crate::expression::ExpressionBuilder;
use crate::planner::{self, emit, residual, QueryPlan};
use crate::schema::delegations;
use crate::scim::filter::Filter;
use crate::store::paging::ItemPager;

/// Delegation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationStatus {
    /// The delegation is active.
    Issued,
    /// The delegation has been revoked.
    Revoked,
}

impl DelegationStatus {
    /// The stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Revoked => "revoked",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "issued" => Some(Self::Issued),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OAuth delegation.
#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    /// Delegation identifier, the partition key.
    pub id: String,
    /// Lifecycle status.
    pub status: DelegationStatus,
    /// The subject that granted the delegation.
    pub owner: String,
    /// The OAuth client it was granted to.
    pub client_id: String,
    /// Hash of the authorization code, when one was issued.
    pub authorization_code_hash: Option<String>,
    /// Expiry time, epoch seconds.
    pub expires: i64,
    /// Redirect URI of the authorization request.
    pub redirect_uri: Option<String>,
    /// Authentication attributes blob.
    pub authentication: Value,
    /// Consent decisions blob.
    pub consent: Value,
    /// Claim values blob.
    pub claims: Value,
}

/// Data-access operations for delegations.
pub struct DelegationStore<C> {
    client: Arc<C>,
    config: DapConfig,
}

impl<C: StoreClient> DelegationStore<C> {
    /// A store over the given client.
    #[must_use]
    pub fn new(client: Arc<C>, config: DapConfig) -> Self {
        Self { client, config }
    }

    /// Persists a delegation. The id is caller-assigned; an existing
    /// delegation with the same id is overwritten.
    pub async fn create(&self, delegation: &Delegation) -> DapResult<()> {
        let request = PutItemRequest {
            table_name: delegations::TABLE.physical_name().to_owned(),
            item: delegation_item(delegation)?,
            ..PutItemRequest::default()
        };
        self.client.put_item(request).await?;
        Ok(())
    }

    /// Strongly-consistent read by id.
    pub async fn get_by_id(&self, id: &str) -> DapResult<Option<Delegation>> {
        let mut key = Item::new();
        key.insert(delegations::ID.name().to_owned(), NativeValue::string(id));
        let mut request = GetItemRequest::new(delegations::TABLE.physical_name(), key);
        request.consistent_read = true;

        match self.client.get_item(request).await? {
            Some(item) => Ok(Some(delegation_from_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Looks a delegation up by its authorization code hash through
    /// `authorization-hash-index`.
    pub async fn get_by_authorization_code_hash(
        &self,
        hash: &str,
    ) -> DapResult<Option<Delegation>> {
        let mut builder = ExpressionBuilder::new();
        let name = builder.name_ref(&delegations::AUTHORIZATION_CODE_HASH);
        let value = builder.value_ref(
            &delegations::AUTHORIZATION_CODE_HASH,
            NativeValue::string(hash),
        );
        let key_condition_expression = format!("{name} = {value}");
        let (names, values) = builder.into_parts();

        let request = idvault_model::QueryRequest {
            table_name: delegations::TABLE.physical_name().to_owned(),
            index_name: Some("authorization-hash-index".to_owned()),
            key_condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            ..idvault_model::QueryRequest::default()
        };

        let mut pager = ItemPager::query(self.client.as_ref(), request);
        match pager.try_next().await? {
            Some(item) => Ok(Some(delegation_from_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Transitions a delegation's status in place.
    ///
    /// # Errors
    ///
    /// [`DapError::Conflict`] when the delegation does not exist.
    pub async fn set_status(&self, id: &str, status: DelegationStatus) -> DapResult<()> {
        let mut builder = ExpressionBuilder::new();
        let status_name = builder.name_ref(&delegations::STATUS);
        let status_value = builder.value_ref(
            &delegations::STATUS,
            NativeValue::string(status.as_str()),
        );
        let update_expression = format!("SET {status_name} = {status_value}");
        let id_name = builder.name_ref(&delegations::ID);
        let condition_expression = format!("attribute_exists({id_name})");
        let (names, values) = builder.into_parts();

        let mut key = Item::new();
        key.insert(delegations::ID.name().to_owned(), NativeValue::string(id));
        let request = UpdateItemRequest {
            table_name: delegations::TABLE.physical_name().to_owned(),
            key,
            update_expression,
            condition_expression: Some(condition_expression),
            expression_attribute_names: names,
            expression_attribute_values: values,
        };

        match self.client.update_item(request).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_condition_failure() => {
                Err(DapError::Conflict(format!("unknown delegation '{id}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lists delegations matching a filter: plan, execute, re-filter,
    /// deduplicate by id in first-seen order.
    pub async fn get_all(&self, filter: &Filter) -> DapResult<Vec<Delegation>> {
        let mut result: Vec<Delegation> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        match planner::plan(filter, &delegations::TABLE)? {
            QueryPlan::UsingQueries(queries) => {
                for planned in &queries {
                    let request = emit::emit_query(&delegations::TABLE, planned);
                    let mut pager = ItemPager::query(self.client.as_ref(), request);
                    while let Some(item) = pager.try_next().await? {
                        if !residual::any_product_holds(&planned.residuals, &item) {
                            continue;
                        }
                        let delegation = delegation_from_item(&item)?;
                        if seen.insert(delegation.id.clone()) {
                            result.push(delegation);
                        }
                    }
                }
            }
            QueryPlan::UsingScan(dnf) => {
                if !self.config.allow_table_scans {
                    return Err(DapError::QueryRequiresTableScan);
                }
                let request = emit::emit_scan(&delegations::TABLE, &dnf, None);
                let mut pager = ItemPager::scan(self.client.as_ref(), request);
                while let Some(item) = pager.try_next().await? {
                    if !dnf.matches(&item) {
                        continue;
                    }
                    let delegation = delegation_from_item(&item)?;
                    if seen.insert(delegation.id.clone()) {
                        result.push(delegation);
                    }
                }
            }
        }

        Ok(result)
    }
}

fn delegation_item(delegation: &Delegation) -> DapResult<Item> {
    let encode_blob = |value: &Value| -> DapResult<String> {
        serde_json::to_string(value).map_err(|e| DapError::Serialization(e.to_string()))
    };

    let mut item = Item::new();
    item.insert(
        delegations::ID.name().to_owned(),
        NativeValue::string(&delegation.id),
    );
    item.insert(
        delegations::STATUS.name().to_owned(),
        NativeValue::string(delegation.status.as_str()),
    );
    item.insert(
        delegations::OWNER.name().to_owned(),
        NativeValue::string(&delegation.owner),
    );
    item.insert(
        delegations::CLIENT_ID.name().to_owned(),
        NativeValue::string(&delegation.client_id),
    );
    if let Some(hash) = &delegation.authorization_code_hash {
        item.insert(
            delegations::AUTHORIZATION_CODE_HASH.name().to_owned(),
            NativeValue::string(hash),
        );
    }
    item.insert(
        delegations::EXPIRES.name().to_owned(),
        NativeValue::number(delegation.expires),
    );
    if let Some(uri) = &delegation.redirect_uri {
        item.insert(
            delegations::REDIRECT_URI.name().to_owned(),
            NativeValue::string(uri),
        );
    }
    item.insert(
        delegations::AUTHENTICATION.name().to_owned(),
        NativeValue::S(encode_blob(&delegation.authentication)?),
    );
    item.insert(
        delegations::CONSENT.name().to_owned(),
        NativeValue::S(encode_blob(&delegation.consent)?),
    );
    item.insert(
        delegations::CLAIMS.name().to_owned(),
        NativeValue::S(encode_blob(&delegation.claims)?),
    );
    Ok(item)
}

fn delegation_from_item(item: &Item) -> DapResult<Delegation> {
    let required = |attr: &crate::schema::AttributeDescriptor| -> DapResult<String> {
        item.get(attr.name())
            .and_then(NativeValue::as_s)
            .map(str::to_owned)
            .ok_or_else(|| DapError::missing_attribute(attr.name()))
    };
    let optional = |attr: &crate::schema::AttributeDescriptor| -> Option<String> {
        item.get(attr.name())
            .and_then(NativeValue::as_s)
            .map(str::to_owned)
    };
    let decode_blob = |attr: &crate::schema::AttributeDescriptor| -> DapResult<Value> {
        match optional(attr) {
            Some(blob) => {
                serde_json::from_str(&blob).map_err(|e| DapError::Serialization(e.to_string()))
            }
            None => Ok(Value::Null),
        }
    };

    let status_text = required(&delegations::STATUS)?;
    let status = DelegationStatus::from_str(&status_text).ok_or_else(|| DapError::Schema {
        attribute: delegations::STATUS.name().to_owned(),
        message: format!("unknown status '{status_text}'"),
    })?;

    Ok(Delegation {
        id: required(&delegations::ID)?,
        status,
        owner: required(&delegations::OWNER)?,
        client_id: required(&delegations::CLIENT_ID)?,
        authorization_code_hash: optional(&delegations::AUTHORIZATION_CODE_HASH),
        expires: item
            .get(delegations::EXPIRES.name())
            .and_then(NativeValue::as_n)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| DapError::missing_attribute(delegations::EXPIRES.name()))?,
        redirect_uri: optional(&delegations::REDIRECT_URI),
        authentication: decode_blob(&delegations::AUTHENTICATION)?,
        consent: decode_blob(&delegations::CONSENT)?,
        claims: decode_blob(&delegations::CLAIMS)?,
    })
}

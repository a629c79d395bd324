//! The account-link store: single-item patterns over the links table.

use std::sync::Arc;

use chrono::Utc;
use idvault_model::{
    DeleteItemRequest, GetItemRequest, Item, NativeValue, PutItemRequest, StoreClient,
};

use crate::error::{DapError, DapResult};
use crate::expression::ExpressionBuilder;
use crate::schema::links;
use crate::store::paging::ItemPager;

/// A link between a foreign account and a local one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The foreign account identifier.
    pub linked_account_id: String,
    /// The domain the foreign account lives in.
    pub linked_account_domain_name: String,
    /// The local account the link points at.
    pub local_account_id: String,
    /// The account manager that created the link.
    pub linking_account_manager: String,
    /// Creation time, epoch seconds.
    pub created: i64,
}

/// Data-access operations for account links.
pub struct LinkStore<C> {
    client: Arc<C>,
}

impl<C: StoreClient> LinkStore<C> {
    /// A store over the given client.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Creates (or overwrites) a link. Links have no version counter;
    /// the last writer wins.
    pub async fn create_link(
        &self,
        linking_account_manager: &str,
        local_account_id: &str,
        linked_account_id: &str,
        linked_account_domain_name: &str,
    ) -> DapResult<Link> {
        let link = Link {
            linked_account_id: linked_account_id.to_owned(),
            linked_account_domain_name: linked_account_domain_name.to_owned(),
            local_account_id: local_account_id.to_owned(),
            linking_account_manager: linking_account_manager.to_owned(),
            created: Utc::now().timestamp(),
        };

        let request = PutItemRequest {
            table_name: links::TABLE.physical_name().to_owned(),
            item: link_item(&link),
            ..PutItemRequest::default()
        };
        self.client.put_item(request).await?;
        Ok(link)
    }

    /// Strongly-consistent read of one link.
    pub async fn get_link(
        &self,
        linked_account_id: &str,
        linked_account_domain_name: &str,
    ) -> DapResult<Option<Link>> {
        let mut key = Item::new();
        key.insert(
            links::PK.name().to_owned(),
            NativeValue::S(links::link_pk(linked_account_id, linked_account_domain_name)),
        );
        let mut request = GetItemRequest::new(links::TABLE.physical_name(), key);
        request.consistent_read = true;

        match self.client.get_item(request).await? {
            Some(item) => Ok(Some(link_from_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Lists the links of a local account created by one account manager,
    /// via `list-links-index`.
    pub async fn list_links(
        &self,
        linking_account_manager: &str,
        local_account_id: &str,
    ) -> DapResult<Vec<Link>> {
        let mut builder = ExpressionBuilder::new();
        let account_name = builder.name_ref(&links::LOCAL_ACCOUNT_ID);
        let account_value = builder.value_ref(
            &links::LOCAL_ACCOUNT_ID,
            NativeValue::string(local_account_id),
        );
        let manager_name = builder.name_ref(&links::LINKING_ACCOUNT_MANAGER);
        let manager_value = builder.value_ref(
            &links::LINKING_ACCOUNT_MANAGER,
            NativeValue::string(linking_account_manager),
        );
        let key_condition_expression =
            format!("{account_name} = {account_value} AND {manager_name} = {manager_value}");
        let (names, values) = builder.into_parts();

        let request = idvault_model::QueryRequest {
            table_name: links::TABLE.physical_name().to_owned(),
            index_name: Some("list-links-index".to_owned()),
            key_condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            ..idvault_model::QueryRequest::default()
        };

        let items = ItemPager::query(self.client.as_ref(), request)
            .collect_remaining()
            .await?;
        items.iter().map(link_from_item).collect()
    }

    /// Deletes a link. Deleting a link that does not exist succeeds.
    pub async fn delete_link(
        &self,
        linked_account_id: &str,
        linked_account_domain_name: &str,
    ) -> DapResult<()> {
        let mut key = Item::new();
        key.insert(
            links::PK.name().to_owned(),
            NativeValue::S(links::link_pk(linked_account_id, linked_account_domain_name)),
        );
        let request = DeleteItemRequest {
            table_name: links::TABLE.physical_name().to_owned(),
            key,
            ..DeleteItemRequest::default()
        };
        self.client.delete_item(request).await?;
        Ok(())
    }
}

fn link_item(link: &Link) -> Item {
    let mut item = Item::new();
    item.insert(
        links::PK.name().to_owned(),
        NativeValue::S(links::link_pk(
            &link.linked_account_id,
            &link.linked_account_domain_name,
        )),
    );
    item.insert(
        links::LINKED_ACCOUNT_ID.name().to_owned(),
        NativeValue::string(&link.linked_account_id),
    );
    item.insert(
        links::LINKED_ACCOUNT_DOMAIN.name().to_owned(),
        NativeValue::string(&link.linked_account_domain_name),
    );
    item.insert(
        links::LOCAL_ACCOUNT_ID.name().to_owned(),
        NativeValue::string(&link.local_account_id),
    );
    item.insert(
        links::LINKING_ACCOUNT_MANAGER.name().to_owned(),
        NativeValue::string(&link.linking_account_manager),
    );
    item.insert(
        links::CREATED.name().to_owned(),
        NativeValue::number(link.created),
    );
    item
}

fn link_from_item(item: &Item) -> DapResult<Link> {
    let required = |attr: &crate::schema::AttributeDescriptor| -> DapResult<String> {
        item.get(attr.name())
            .and_then(NativeValue::as_s)
            .map(str::to_owned)
            .ok_or_else(|| DapError::missing_attribute(attr.name()))
    };

    Ok(Link {
        linked_account_id: required(&links::LINKED_ACCOUNT_ID)?,
        linked_account_domain_name: required(&links::LINKED_ACCOUNT_DOMAIN)?,
        local_account_id: required(&links::LOCAL_ACCOUNT_ID)?,
        linking_account_manager: required(&links::LINKING_ACCOUNT_MANAGER)?,
        created: item
            .get(links::CREATED.name())
            .and_then(NativeValue::as_n)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| DapError::missing_attribute(links::CREATED.name()))?,
    })
}

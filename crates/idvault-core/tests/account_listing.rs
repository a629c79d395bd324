//! End-to-end tests of planner-driven account listing.

mod common;

use idvault_core::scim::{AccountAttributes, Filter, ResourceQuery};
use idvault_core::store::AccountStore;
use idvault_core::{DapConfig, DapError};
use serde_json::json;

fn scanning_store(
    store: &std::sync::Arc<idvault_memory::InMemoryStore>,
) -> AccountStore<idvault_memory::InMemoryStore> {
    AccountStore::new(
        std::sync::Arc::clone(store),
        DapConfig::default().with_table_scans(),
    )
}

async fn seed(accounts: &AccountStore<idvault_memory::InMemoryStore>) {
    for (name, email, active) in [
        ("ada", Some("ada@example.com"), true),
        ("brook", Some("brook@example.com"), true),
        ("cleo", None, false),
        ("dara", Some("dara@example.com"), true),
    ] {
        let mut attrs = AccountAttributes::new(name).with_active(active);
        if let Some(email) = email {
            attrs = attrs.with_email(email);
        }
        accounts.create(&attrs).await.unwrap();
    }
}

#[tokio::test]
async fn test_should_list_by_unique_attribute_without_scanning() {
    let store = common::store();
    // Scans stay disabled: an indexable filter must not need them.
    let accounts = AccountStore::new(std::sync::Arc::clone(&store), DapConfig::default());
    seed(&accounts).await;

    let query = ResourceQuery::filtered(Filter::parse(r#"userName eq "ada""#).unwrap());
    let result = accounts.get_all(&query).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].user_name, "ada");
}

#[tokio::test]
async fn test_should_union_disjuncts_without_duplicates() {
    let store = common::store();
    let accounts = AccountStore::new(std::sync::Arc::clone(&store), DapConfig::default());
    seed(&accounts).await;

    // Both disjuncts resolve to the same account; the union deduplicates
    // by accountId in first-seen order.
    let filter =
        Filter::parse(r#"userName eq "ada" or emails.value eq "ada@example.com""#).unwrap();
    let result = accounts.get_all(&ResourceQuery::filtered(filter)).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].user_name, "ada");
}

#[tokio::test]
async fn test_should_gate_scans_behind_configuration() {
    let store = common::store();
    let gated = AccountStore::new(std::sync::Arc::clone(&store), DapConfig::default());
    seed(&gated).await;

    // No filter at all forces a scan.
    let err = gated.get_all(&ResourceQuery::default()).await.unwrap_err();
    assert!(matches!(err, DapError::QueryRequiresTableScan));

    // A non-indexable filter forces a scan too.
    let filter = Filter::parse("active eq true").unwrap();
    let err = gated
        .get_all(&ResourceQuery::filtered(filter))
        .await
        .unwrap_err();
    assert!(matches!(err, DapError::QueryRequiresTableScan));
}

#[tokio::test]
async fn test_should_scan_only_main_items() {
    let store = common::store();
    let accounts = scanning_store(&store);
    seed(&accounts).await;

    // Eleven physical items back these four accounts; the ai# namespace
    // conjunct must keep secondary items out of the result.
    let result = accounts.get_all(&ResourceQuery::default()).await.unwrap();
    assert_eq!(result.len(), 4);
}

#[tokio::test]
async fn test_should_filter_scans_exactly() {
    let store = common::store();
    let accounts = scanning_store(&store);
    seed(&accounts).await;

    let filter = Filter::parse("active eq true").unwrap();
    let result = accounts.get_all(&ResourceQuery::filtered(filter)).await.unwrap();
    assert_eq!(result.len(), 3);
    assert!(result.iter().all(|a| a.active));
}

#[tokio::test]
async fn test_should_sort_and_paginate_results() {
    let store = common::store();
    let accounts = scanning_store(&store);
    seed(&accounts).await;

    let query = ResourceQuery {
        sort_by: Some("userName".to_owned()),
        start_index: 1,
        count: Some(2),
        ..ResourceQuery::default()
    };
    let result = accounts.get_all(&query).await.unwrap();
    let names: Vec<_> = result.iter().map(|a| a.user_name.as_str()).collect();
    assert_eq!(names, vec!["brook", "cleo"]);

    let descending = ResourceQuery {
        sort_by: Some("userName".to_owned()),
        descending: true,
        count: Some(1),
        ..ResourceQuery::default()
    };
    let result = accounts.get_all(&descending).await.unwrap();
    assert_eq!(result[0].user_name, "dara");
}

#[tokio::test]
async fn test_should_reject_unsortable_sort_attribute() {
    let store = common::store();
    let accounts = scanning_store(&store);
    seed(&accounts).await;

    let query = ResourceQuery {
        sort_by: Some("active".to_owned()),
        ..ResourceQuery::default()
    };
    assert!(matches!(
        accounts.get_all(&query).await,
        Err(DapError::UnsupportedQuery(_))
    ));
}

#[tokio::test]
async fn test_should_project_requested_bag_attributes() {
    let store = common::store();
    let accounts = scanning_store(&store);

    accounts
        .create(
            &AccountAttributes::new("rich")
                .with_extra("displayName", json!("Rich"))
                .with_extra("locale", json!("sv_SE")),
        )
        .await
        .unwrap();

    let query = ResourceQuery {
        attributes: vec!["displayName".to_owned()],
        ..ResourceQuery::default()
    };
    let result = accounts.get_all(&query).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].extra.get("displayName"), Some(&json!("Rich")));
    assert!(!result[0].extra.contains_key("locale"));
}

#[tokio::test]
async fn test_should_drain_paginated_scans() {
    let store = common::paged_store(2);
    let accounts = scanning_store(&store);
    seed(&accounts).await;

    // Four accounts across several store pages.
    let result = accounts.get_all(&ResourceQuery::default()).await.unwrap();
    assert_eq!(result.len(), 4);
}

#[tokio::test]
async fn test_should_reject_too_many_disjuncts() {
    let store = common::store();
    let accounts = AccountStore::new(std::sync::Arc::clone(&store), DapConfig::default());

    let input = (1..=9)
        .map(|i| format!(r#"userName eq "user{i}""#))
        .collect::<Vec<_>>()
        .join(" or ");
    let filter = Filter::parse(&input).unwrap();
    assert!(matches!(
        accounts.get_all(&ResourceQuery::filtered(filter)).await,
        Err(DapError::QueryRequiresTooManyOperations)
    ));
}

//! End-to-end tests of the account fan-out protocol.

mod common;

use idvault_core::scim::{AccountAttributes, AttributeUpdate};
use idvault_core::store::AccountStore;
use idvault_core::{DapConfig, DapError};
use idvault_model::{NativeValue, PutItemRequest, StoreClient};
use serde_json::json;

fn account_store(
    store: &std::sync::Arc<idvault_memory::InMemoryStore>,
) -> AccountStore<idvault_memory::InMemoryStore> {
    AccountStore::new(std::sync::Arc::clone(store), DapConfig::default())
}

#[tokio::test]
async fn test_should_round_trip_created_account() {
    let store = common::store();
    let accounts = account_store(&store);

    let attrs = AccountAttributes::new("alice")
        .with_email("alice@example.com")
        .with_password("argon2-hash")
        .with_extra("displayName", json!("Alice Q."));
    let created = accounts.create(&attrs).await.unwrap();
    assert_eq!(created.version, 0);

    let fetched = accounts.get_by_id(&created.account_id).await.unwrap().unwrap();
    assert_eq!(fetched.user_name, "alice");
    assert_eq!(fetched.email.as_deref(), Some("alice@example.com"));
    assert_eq!(fetched.extra.get("displayName"), Some(&json!("Alice Q.")));
    assert_eq!(fetched.created, created.created);

    // The password hash never appears in read results.
    let attributes = fetched.attributes();
    assert!(attributes.password.is_none());
}

#[tokio::test]
async fn test_should_get_created_account_by_email() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(&AccountAttributes::new("alice").with_email("alice@example.com"))
        .await
        .unwrap();

    let by_email = accounts
        .get_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.user_name, "alice");
    assert_eq!(by_email.account_id, created.account_id);
}

#[tokio::test]
async fn test_should_write_one_item_per_unique_attribute() {
    let store = common::store();
    let accounts = account_store(&store);

    accounts
        .create(&AccountAttributes::new("nia"))
        .await
        .unwrap();
    // Main item + userName item.
    assert_eq!(store.item_count("curity-accounts"), 2);

    accounts
        .create(
            &AccountAttributes::new("omar")
                .with_email("omar@example.com")
                .with_phone("+15551234"),
        )
        .await
        .unwrap();
    // Plus main + userName + email + phone.
    assert_eq!(store.item_count("curity-accounts"), 6);
}

#[tokio::test]
async fn test_should_conflict_on_duplicate_user_name() {
    let store = common::store();
    let accounts = account_store(&store);

    accounts
        .create(&AccountAttributes::new("dup"))
        .await
        .unwrap();
    let err = accounts
        .create(&AccountAttributes::new("dup"))
        .await
        .unwrap_err();
    assert!(matches!(err, DapError::Conflict(_)));
}

#[tokio::test]
async fn test_should_conflict_on_duplicate_phone() {
    let store = common::store();
    let accounts = account_store(&store);

    accounts
        .create(&AccountAttributes::new("first").with_phone("+15551234"))
        .await
        .unwrap();
    let err = accounts
        .create(&AccountAttributes::new("second").with_phone("+15551234"))
        .await
        .unwrap_err();
    assert!(matches!(err, DapError::Conflict(_)));

    // The failed transaction left nothing behind.
    assert!(accounts.get_by_user_name("second").await.unwrap().is_none());
}

#[tokio::test]
async fn test_should_keep_all_lookups_consistent_after_update() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(
            &AccountAttributes::new("sam")
                .with_email("sam@example.com")
                .with_phone("+4670000001"),
        )
        .await
        .unwrap();

    let mut attrs = created.attributes();
    attrs.active = false;
    let updated = accounts
        .update(&created.account_id, &attrs)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.version, created.version + 1);

    let by_id = accounts.get_by_id(&created.account_id).await.unwrap().unwrap();
    let by_name = accounts.get_by_user_name("sam").await.unwrap().unwrap();
    let by_email = accounts.get_by_email("sam@example.com").await.unwrap().unwrap();
    let by_phone = accounts.get_by_phone("+4670000001").await.unwrap().unwrap();

    for account in [&by_name, &by_email, &by_phone] {
        assert_eq!(account, &by_id);
        assert_eq!(account.version, updated.version);
        assert!(!account.active);
    }
}

#[tokio::test]
async fn test_should_move_user_name_item_on_rename() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(&AccountAttributes::new("bob"))
        .await
        .unwrap();

    let mut attrs = created.attributes();
    attrs.user_name = "bobby".to_owned();
    let updated = accounts
        .update(&created.account_id, &attrs)
        .await
        .unwrap()
        .unwrap();

    assert!(accounts.get_by_user_name("bob").await.unwrap().is_none());
    let renamed = accounts.get_by_user_name("bobby").await.unwrap().unwrap();
    assert_eq!(renamed.account_id, created.account_id);
    assert_eq!(renamed.version, created.version + 1);
    assert_eq!(updated.version, created.version + 1);
}

#[tokio::test]
async fn test_should_drop_cleared_email_item() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(&AccountAttributes::new("cleo").with_email("cleo@example.com"))
        .await
        .unwrap();
    assert_eq!(store.item_count("curity-accounts"), 3);

    let mut attrs = created.attributes();
    attrs.email = None;
    accounts.update(&created.account_id, &attrs).await.unwrap();

    assert!(accounts
        .get_by_email("cleo@example.com")
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.item_count("curity-accounts"), 2);
}

#[tokio::test]
async fn test_should_treat_update_of_missing_account_as_noop() {
    let store = common::store();
    let accounts = account_store(&store);

    let result = accounts
        .update("no-such-id", &AccountAttributes::new("ghost"))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(store.item_count("curity-accounts"), 0);
}

#[tokio::test]
async fn test_should_delete_all_fanout_items() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(
            &AccountAttributes::new("gone")
                .with_email("gone@example.com")
                .with_phone("+460000002"),
        )
        .await
        .unwrap();
    assert_eq!(store.item_count("curity-accounts"), 4);

    accounts.delete(&created.account_id).await.unwrap();
    assert_eq!(store.item_count("curity-accounts"), 0);
    assert!(accounts.get_by_user_name("gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_should_succeed_deleting_missing_account() {
    let store = common::store();
    let accounts = account_store(&store);
    accounts.delete("never-existed").await.unwrap();
}

#[tokio::test]
async fn test_should_surface_conflict_when_fanout_versions_drift() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(&AccountAttributes::new("raced"))
        .await
        .unwrap();

    // Sabotage the userName item's version so every precondition on it
    // fails; the retry loop must exhaust and surface a conflict.
    let mut rogue = idvault_model::Item::new();
    rogue.insert("pk".to_owned(), NativeValue::string("un#raced"));
    rogue.insert("accountId".to_owned(), NativeValue::string(&created.account_id));
    rogue.insert("userName".to_owned(), NativeValue::string("raced"));
    rogue.insert("active".to_owned(), NativeValue::Bool(true));
    rogue.insert("created".to_owned(), NativeValue::number(created.created));
    rogue.insert("updated".to_owned(), NativeValue::number(created.updated));
    rogue.insert("version".to_owned(), NativeValue::number(99));
    store
        .put_item(PutItemRequest {
            table_name: "curity-accounts".to_owned(),
            item: rogue,
            ..PutItemRequest::default()
        })
        .await
        .unwrap();

    let err = accounts
        .update(&created.account_id, &created.attributes())
        .await
        .unwrap_err();
    assert!(matches!(err, DapError::Conflict(_)));
}

#[tokio::test]
async fn test_should_patch_attributes_without_touching_password() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(
            &AccountAttributes::new("pat")
                .with_email("pat@old.example")
                .with_password("original-hash"),
        )
        .await
        .unwrap();

    let patch = AttributeUpdate::default()
        .replace("email", json!("pat@new.example"))
        .replace("password", json!("stolen-hash"))
        .add("displayName", json!("Pat"));
    let patched = accounts
        .patch(&created.account_id, &patch)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(patched.email.as_deref(), Some("pat@new.example"));
    assert_eq!(patched.extra.get("displayName"), Some(&json!("Pat")));
    assert!(accounts.get_by_email("pat@old.example").await.unwrap().is_none());

    // The password survived the ignored field-level change.
    let subject = accounts
        .verify_password("pat", "irrelevant")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subject.password.as_deref(), Some("original-hash"));
}

#[tokio::test]
async fn test_should_update_password_on_every_item() {
    let store = common::store();
    let accounts = account_store(&store);

    let created = accounts
        .create(
            &AccountAttributes::new("pw")
                .with_email("pw@example.com")
                .with_password("old-hash"),
        )
        .await
        .unwrap();

    accounts.update_password("pw", "new-hash").await.unwrap();

    let subject = accounts
        .verify_password("pw", "irrelevant")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subject.password.as_deref(), Some("new-hash"));
    assert_eq!(subject.account_id, created.account_id);

    // The version advanced everywhere, payloads stayed aligned.
    let by_email = accounts.get_by_email("pw@example.com").await.unwrap().unwrap();
    assert_eq!(by_email.version, created.version + 1);
}

#[tokio::test]
async fn test_should_noop_password_update_for_unknown_user() {
    let store = common::store();
    let accounts = account_store(&store);
    accounts
        .update_password("nobody", "hash")
        .await
        .unwrap();
    assert_eq!(store.item_count("curity-accounts"), 0);
}

#[tokio::test]
async fn test_should_refuse_password_verification_for_inactive_account() {
    let store = common::store();
    let accounts = account_store(&store);

    accounts
        .create(
            &AccountAttributes::new("frozen")
                .with_password("hash")
                .with_active(false),
        )
        .await
        .unwrap();

    assert!(accounts
        .verify_password("frozen", "hash")
        .await
        .unwrap()
        .is_none());
    assert!(accounts
        .verify_password("missing", "hash")
        .await
        .unwrap()
        .is_none());
}

//! Shared fixtures for integration tests against the in-memory store.
// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use idvault_memory::{InMemoryStore, TableSchema};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// An in-memory store with all three tables registered.
pub fn store() -> Arc<InMemoryStore> {
    init_tracing();
    let store = InMemoryStore::new();
    register_tables(&store);
    Arc::new(store)
}

/// Same as [`store`], with Query/Scan pages capped at `page_size` items so
/// the pagination paths run.
pub fn paged_store(page_size: usize) -> Arc<InMemoryStore> {
    init_tracing();
    let store = InMemoryStore::new().with_page_size(page_size);
    register_tables(&store);
    Arc::new(store)
}

fn register_tables(store: &InMemoryStore) {
    store.register_table(TableSchema::new("curity-accounts", "pk"));
    store.register_table(TableSchema::new("curity-links", "pk").with_index(
        "list-links-index",
        "accountId",
        Some("linkingAccountManager"),
    ));
    store.register_table(
        TableSchema::new("curity-delegations", "id")
            .with_index("owner-status-index", "owner", Some("status"))
            .with_index("clientId-status-index", "clientId", Some("status"))
            .with_index("authorization-hash-index", "authorizationCodeHash", None),
    );
}

//! Entity stores over the store-client contract.

pub mod accounts;
pub mod delegations;
pub mod links;
pub mod paging;
pub mod retry;
pub mod update;

pub use accounts::AccountStore;
pub use delegations::{Delegation, DelegationStatus, DelegationStore};
pub use links::{Link, LinkStore};
pub use paging::ItemPager;
pub use retry::{run_with_retries, TransactionAttemptResult};
pub use update::UpdateBuilder;

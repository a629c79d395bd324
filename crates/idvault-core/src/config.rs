//! Data-access layer configuration.

use std::env;

/// Configuration for the data-access layer.
#[derive(Debug, Clone)]
pub struct DapConfig {
    /// Permit plans that fall back to a full table scan. When `false`,
    /// any operation that would scan fails with
    /// [`DapError::QueryRequiresTableScan`](crate::DapError::QueryRequiresTableScan).
    pub allow_table_scans: bool,
    /// Maximum attempts for optimistic-concurrency transactions.
    pub max_transaction_attempts: u32,
}

impl DapConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            allow_table_scans: env_bool("IDVAULT_ALLOW_TABLE_SCANS", false),
            max_transaction_attempts: env::var("IDVAULT_MAX_TRANSACTION_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        }
    }

    /// Enable table scans.
    #[must_use]
    pub fn with_table_scans(mut self) -> Self {
        self.allow_table_scans = true;
        self
    }
}

impl Default for DapConfig {
    fn default() -> Self {
        Self {
            allow_table_scans: false,
            max_transaction_attempts: 3,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.as_str(), "1" | "true" | "yes" | "TRUE" | "YES")
    })
}

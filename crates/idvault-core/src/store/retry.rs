//! Bounded retry for optimistic-concurrency transactions.

use std::future::Future;

use tracing::debug;

use crate::error::{DapError, DapResult};

/// The outcome of one transaction attempt.
#[derive(Debug)]
pub enum TransactionAttemptResult<T> {
    /// The transaction committed; stop retrying.
    Success(T),
    /// A precondition no longer held; re-read and try again.
    Failure(DapError),
}

/// Runs `attempt` up to `max_attempts` times.
///
/// `Success` short-circuits; `Failure` retries immediately (the retries
/// exist purely to absorb optimistic-concurrency races, so there is
/// nothing to wait for); errors returned by the attempt itself propagate
/// unchanged. After exhaustion the last failure's error is surfaced.
pub async fn run_with_retries<T, F, Fut>(max_attempts: u32, mut attempt: F) -> DapResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DapResult<TransactionAttemptResult<T>>>,
{
    let attempts = max_attempts.max(1);
    let mut last_error = DapError::Conflict("transaction attempts exhausted".to_owned());

    for attempt_number in 1..=attempts {
        match attempt().await? {
            TransactionAttemptResult::Success(value) => return Ok(value),
            TransactionAttemptResult::Failure(error) => {
                debug!(attempt = attempt_number, %error, "transaction attempt failed");
                last_error = error;
            }
        }
    }

    Err(last_error)
}

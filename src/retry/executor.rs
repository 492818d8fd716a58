//! Generic retry execution.

use std::future::Future;

use crate::retry::backoff::{self, RetryPolicy};
use crate::{Error, Result};

/// Run `operation` under `policy`, retrying retryable failures with
/// exponential backoff.
///
/// The inter-attempt wait is a `tokio::time::sleep`, a plain yield point: no
/// lock is held and no thread is blocked, so a cooperative single-threaded
/// runtime keeps making progress while an attempt backs off.
///
/// Terminal failures are wrapped in [`Error::RetryExhausted`] carrying the
/// operation label, the number of attempts actually made and the last
/// underlying failure. A policy with `max_attempts == 0` never invokes the
/// operation and fails with `attempts == 0` and no underlying error.
pub async fn execute<T, F, Fut>(label: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<Error> = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(label, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let exhausted = attempt + 1 == policy.max_attempts;
                let retryable = err.is_retryable();

                if exhausted || !retryable {
                    tracing::warn!(
                        label,
                        attempts = attempt + 1,
                        retryable,
                        error = %err,
                        "operation failed terminally"
                    );
                    return Err(Error::RetryExhausted {
                        label: label.to_string(),
                        attempts: attempt + 1,
                        source: Some(Box::new(err)),
                    });
                }

                let delay = backoff::delay(attempt, policy);
                tracing::warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                last_error = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }

    // max_attempts == 0: zero attempts made, explicit contract.
    Err(Error::RetryExhausted {
        label: label.to_string(),
        attempts: 0,
        source: last_error.map(Box::new),
    })
}

//! Bounded Retry - Exponential Backoff Around Fallible Calls
//!
//! Runs an async operation up to `max_attempts` times, sleeping per the
//! `ExponentialBackoff` policy between attempts. Errors classify
//! themselves: a terminal error stops immediately, a retryable one is
//! retried until attempts run out. Cancellation is by dropping the
//! returned future (callers select it against their shutdown signal).

use std::future::Future;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::backoff::ExponentialBackoff;

/// Whether another attempt could succeed.
pub trait Retryable {
  fn is_retryable(&self) -> bool;
}

/// Final failure of a retried operation.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {source}")]
pub struct RetryError<E: std::error::Error + 'static> {
  /// Attempts actually made.
  pub attempts: u32,
  /// Error of the last attempt.
  #[source]
  pub source: E,
}

impl<E: std::error::Error + Retryable + 'static> RetryError<E> {
  /// True when retrying stopped because the error was terminal.
  pub fn is_terminal(&self) -> bool {
    !self.source.is_retryable()
  }
}

/// Retry `op` (called with the 1-based attempt number) under `backoff`.
pub async fn retry<T, E, F, Fut>(
  max_attempts: u32,
  backoff: &ExponentialBackoff,
  mut op: F,
) -> Result<T, RetryError<E>>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::error::Error + Retryable + 'static,
{
  let max_attempts = max_attempts.max(1);
  let mut attempt = 0;

  loop {
    attempt += 1;
    match op(attempt).await {
      Ok(value) => return Ok(value),
      Err(e) if !e.is_retryable() => {
        debug!(attempt, error = %e, "Terminal error, not retrying");
        return Err(RetryError {
          attempts: attempt,
          source: e,
        });
      }
      Err(e) if attempt >= max_attempts => {
        return Err(RetryError {
          attempts: attempt,
          source: e,
        });
      }
      Err(e) => {
        let delay = backoff.delay(attempt - 1);
        warn!(
          attempt,
          max_attempts,
          delay_ms = delay.as_millis(),
          error = %e,
          "Attempt failed, retrying"
        );
        sleep(delay).await;
      }
    }
  }
}

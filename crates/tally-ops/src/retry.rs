//! Bounded exponential backoff for transient store faults.

use std::{fmt::Display, future::Future, time::Duration};

use tally_core::store::StoreFault;

/// How many times, and how patiently, a store call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts including the first. Zero is treated as one.
  pub max_attempts:    u32,
  pub initial_backoff: Duration,
  pub max_backoff:     Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:    4,
      initial_backoff: Duration::from_millis(50),
      max_backoff:     Duration::from_secs(2),
    }
  }
}

impl RetryPolicy {
  /// A policy that makes exactly one attempt.
  pub fn never() -> Self { Self { max_attempts: 1, ..Self::default() } }
}

/// Run `op` until it succeeds, fails with a non-transient fault, or the
/// policy's attempts are used up. The last error is returned unchanged.
///
/// Backoff starts at `initial_backoff` and doubles after every failed
/// attempt, capped at `max_backoff`.
pub async fn with_retry<F, Fut, T, E>(
  operation: &str,
  policy: &RetryPolicy,
  mut op: F,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: StoreFault + Display,
{
  let max_attempts = policy.max_attempts.max(1);
  let mut backoff = policy.initial_backoff;
  let mut attempt = 0;

  loop {
    attempt += 1;

    match op().await {
      Ok(value) => {
        if attempt > 1 {
          tracing::debug!(operation, attempt, "store call succeeded after retry");
        }
        return Ok(value);
      }
      Err(err) => {
        let class = err.class();
        if !class.is_transient() {
          return Err(err);
        }
        if attempt >= max_attempts {
          tracing::error!(
            operation,
            attempt,
            %class,
            error = %err,
            "store call failed, retries exhausted"
          );
          return Err(err);
        }

        tracing::warn!(
          operation,
          attempt,
          %class,
          backoff_ms = backoff.as_millis() as u64,
          error = %err,
          "transient store fault, will retry after backoff"
        );
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max_backoff);
      }
    }
  }
}

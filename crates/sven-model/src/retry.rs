// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Retry policy for provider calls: classification, backoff, and cancellation.
//!
//! Network errors, HTTP 5xx and 429 are retried with exponential backoff and
//! jitter. Authentication failures and malformed-request errors are not —
//! they will not succeed on a second attempt. Cancellation always wins over
//! retry, whether observed before the attempt or during the backoff sleep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Whether a failed provider call should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryable {
    Yes,
    No,
}

/// Classification of a provider-layer failure, used to decide retry/abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network-level failure: connection refused/reset, timeout, DNS.
    Network(String),
    /// HTTP response with a status code.
    Status(u16),
    /// The in-flight call was cancelled.
    Cancelled,
}

/// Classify a [`ProviderError`] as retryable or not.
///
/// - `Network(_)` — always retryable (connection refused, timeout, reset).
/// - `Status(s)` — retryable for 429 and 5xx; not retryable for 4xx otherwise
///   (400 malformed request, 401/403 authentication).
/// - `Cancelled` — never retryable; the caller asked us to stop.
pub fn classify(err: &ProviderError) -> Retryable {
    match err {
        ProviderError::Network(_) => Retryable::Yes,
        ProviderError::Status(s) if *s == 429 || *s >= 500 => Retryable::Yes,
        ProviderError::Status(_) => Retryable::No,
        ProviderError::Cancelled => Retryable::No,
    }
}

/// Retry policy: initial delay, cap, and attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Compute the backoff delay before retry attempt `attempt` (1-indexed).
///
/// `min(max, initial * 2^(attempt - 1))`, jittered by ±10% to avoid a
/// thundering herd when many agents retry against the same provider at once.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(20);
    let scaled = policy.initial.saturating_mul(1u32 << exp);
    let capped = scaled.min(policy.max);
    let jitter_frac = rand::thread_rng().gen_range(-0.1..=0.1);
    let jittered_nanos = (capped.as_nanos() as f64) * (1.0 + jitter_frac);
    Duration::from_nanos(jittered_nanos.max(0.0) as u64)
}

/// Error returned by [`retry_with_policy`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation was cancelled via the [`CancellationToken`].
    Cancelled,
    /// All retry attempts were exhausted; the last error is returned.
    Exhausted(E),
    /// The error was not retryable; returned immediately.
    NotRetryable(E),
}

/// Run `attempt_fn` under `policy`, retrying transient failures with backoff
/// until `policy.max_attempts` is reached or `cancel` fires.
///
/// `attempt_fn` receives the 1-indexed attempt number and must return
/// `Result<T, E>` where `E: Into<ProviderError> + Clone` so it can be
/// classified.  Cancellation is checked both before each attempt and during
/// the backoff sleep (via `tokio::select!`), so a cancellation that arrives
/// mid-wait stops the retry loop immediately rather than after the full delay.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    attempt_fn: F,
) -> Result<T, RetryError<E>>
where
    E: Into<ProviderError> + Clone,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_policy_and_hook(policy, cancel, attempt_fn, |_, _, _| {}).await
}

/// Like [`retry_with_policy`], but calls `on_retry(attempt, delay, &error)`
/// before sleeping for each retried attempt — the hook a caller uses to
/// surface a `retry_attempt` event (spec §4.D) to its own subscribers.
pub async fn retry_with_policy_and_hook<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt_fn: F,
    mut on_retry: impl FnMut(u32, Duration, &E),
) -> Result<T, RetryError<E>>
where
    E: Into<ProviderError> + Clone,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match attempt_fn(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let classified = classify(&e.clone().into());
                if classified == Retryable::No {
                    return Err(RetryError::NotRetryable(e));
                }
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted(e));
                }
                let delay = backoff_delay(policy, attempt);
                on_retry(attempt, delay, &e);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// Tracks whether any text token has been forwarded to the caller during a
/// streaming completion.
///
/// Once the first token reaches the caller, retrying the whole request would
/// duplicate output already seen, so streaming calls stop retrying as soon as
/// any content has been emitted — a mid-stream drop surfaces as an error
/// instead of silently restarting from the top.
#[derive(Debug, Default)]
pub struct StreamRetryGuard {
    any_token_emitted: bool,
}

impl StreamRetryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_token_emitted(&mut self) {
        self.any_token_emitted = true;
    }

    pub fn can_retry(&self) -> bool {
        !self.any_token_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert_eq!(classify(&ProviderError::Network("refused".into())), Retryable::Yes);
    }

    #[test]
    fn status_503_is_retryable() {
        assert_eq!(classify(&ProviderError::Status(503)), Retryable::Yes);
    }

    #[test]
    fn status_429_is_retryable() {
        assert_eq!(classify(&ProviderError::Status(429)), Retryable::Yes);
    }

    #[test]
    fn status_401_is_not_retryable() {
        assert_eq!(classify(&ProviderError::Status(401)), Retryable::No);
    }

    #[test]
    fn status_400_is_not_retryable() {
        assert_eq!(classify(&ProviderError::Status(400)), Retryable::No);
    }

    #[test]
    fn cancelled_is_not_retryable() {
        assert_eq!(classify(&ProviderError::Cancelled), Retryable::No);
    }

    #[test]
    fn backoff_delay_doubles_and_respects_cap() {
        let policy = RetryPolicy { initial: Duration::from_millis(100), max: Duration::from_secs(1), max_attempts: 10 };
        let d1 = backoff_delay(&policy, 1);
        let d2 = backoff_delay(&policy, 2);
        // Jitter is ±10%, so compare against the jitter-free envelope.
        assert!(d1.as_millis() >= 90 && d1.as_millis() <= 110, "d1={d1:?}");
        assert!(d2.as_millis() >= 180 && d2.as_millis() <= 220, "d2={d2:?}");
    }

    #[test]
    fn backoff_delay_is_capped_at_max() {
        let policy = RetryPolicy { initial: Duration::from_millis(100), max: Duration::from_millis(500), max_attempts: 10 };
        let d = backoff_delay(&policy, 10);
        assert!(d.as_millis() <= 550, "delay must respect cap plus jitter: {d:?}");
    }

    #[tokio::test]
    async fn retry_with_policy_succeeds_on_first_attempt() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let result: Result<i32, RetryError<ProviderError>> =
            retry_with_policy(&policy, &cancel, |_| async { Ok::<i32, ProviderError>(42) }).await;
        assert!(matches!(result, Ok(42)));
    }

    #[tokio::test]
    async fn retry_with_policy_retries_transient_then_succeeds() {
        let policy = RetryPolicy { initial: Duration::from_millis(1), max: Duration::from_millis(10), max_attempts: 5 };
        let cancel = CancellationToken::new();
        let result = retry_with_policy(&policy, &cancel, |attempt| async move {
            if attempt < 3 {
                Err(ProviderError::Status(503))
            } else {
                Ok(99)
            }
        }).await;
        assert!(matches!(result, Ok(99)));
    }

    #[tokio::test]
    async fn retry_with_policy_stops_immediately_on_non_retryable() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut attempts = 0;
        let result: Result<i32, RetryError<ProviderError>> =
            retry_with_policy(&policy, &cancel, |_| {
                attempts += 1;
                async { Err(ProviderError::Status(401)) }
            }).await;
        assert!(matches!(result, Err(RetryError::NotRetryable(ProviderError::Status(401)))));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn retry_with_policy_exhausts_after_max_attempts() {
        let policy = RetryPolicy { initial: Duration::from_millis(1), max: Duration::from_millis(5), max_attempts: 3 };
        let cancel = CancellationToken::new();
        let result: Result<i32, RetryError<ProviderError>> =
            retry_with_policy(&policy, &cancel, |_| async { Err(ProviderError::Status(503)) }).await;
        assert!(matches!(result, Err(RetryError::Exhausted(ProviderError::Status(503)))));
    }

    #[tokio::test]
    async fn retry_with_policy_returns_cancelled_when_token_already_cancelled() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<i32, RetryError<ProviderError>> =
            retry_with_policy(&policy, &cancel, |_| async { Ok(1) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[tokio::test]
    async fn retry_with_policy_cancels_during_backoff_sleep() {
        let policy = RetryPolicy { initial: Duration::from_secs(5), max: Duration::from_secs(5), max_attempts: 5 };
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });
        let result: Result<i32, RetryError<ProviderError>> =
            retry_with_policy(&policy, &cancel, |_| async { Err(ProviderError::Status(503)) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn stream_retry_guard_allows_retry_before_any_token() {
        let guard = StreamRetryGuard::new();
        assert!(guard.can_retry());
    }

    #[test]
    fn stream_retry_guard_blocks_retry_after_token_emitted() {
        let mut guard = StreamRetryGuard::new();
        guard.mark_token_emitted();
        assert!(!guard.can_retry());
    }
}

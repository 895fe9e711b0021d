//! Bounded retries over a fixed backoff schedule.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Upper bound for [`exponential_delay`] exponents (2^11 = 2048 seconds).
const MAX_BACKOFF_EXPONENT: u32 = 11;

/// The attempts of [`retry_with_backoff`] ran out, or one failed with an
/// error that retrying cannot fix.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: usize,
    pub last_error: Option<E>,
}

/// Run `op` once per entry of `schedule`, sleeping for that entry's delay
/// before the attempt. Returns the first success.
///
/// `op` receives the 1-based attempt number. Each failure is logged at WARN
/// level together with the attempt count. A failure for which
/// `is_retryable` returns false ends the schedule early.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    schedule: &[Duration],
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total = schedule.len();
    let mut attempts = 0;
    let mut last_error = None;
    for (index, delay) in schedule.iter().enumerate() {
        let attempt = index + 1;
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }
        attempts = attempt;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(target: "retry", %label, attempt, total, error = %e, "attempt failed");
                let retryable = is_retryable(&e);
                last_error = Some(e);
                if !retryable {
                    break;
                }
            }
        }
    }
    Err(RetryExhausted {
        attempts,
        last_error,
    })
}

/// Exponential backoff `2^retry_count` seconds, capped at 2048 seconds.
pub fn exponential_delay(retry_count: u32) -> Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_BACKOFF_EXPONENT));
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_exponential_delay() {
        assert_eq!(exponential_delay(0), Duration::from_secs(1));
        assert_eq!(exponential_delay(1), Duration::from_secs(2));
        assert_eq!(exponential_delay(2), Duration::from_secs(4));
        assert_eq!(exponential_delay(11), Duration::from_secs(2048));
        // capped
        assert_eq!(exponential_delay(12), Duration::from_secs(2048));
        assert_eq!(exponential_delay(100), Duration::from_secs(2048));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_a_later_attempt() {
        let calls = AtomicUsize::new(0);
        let schedule = [Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)];
        let started = tokio::time::Instant::now();

        let result = retry_with_backoff("test", &schedule, |_| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("boom")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_schedule() {
        let schedule = [Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)];
        let result: Result<(), _> =
            retry_with_backoff("test", &schedule, |_| true, |attempt| async move {
                Err(format!("failure {attempt}"))
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_error.as_deref(), Some("failure 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_stops_the_schedule() {
        let calls = AtomicUsize::new(0);
        let schedule = [Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)];
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = retry_with_backoff(
            "test",
            &schedule,
            |e: &String| e != "not found",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("not found".to_string()) }
            },
        )
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

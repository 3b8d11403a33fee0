//! Fixed delay retries for the requests the synchronizer cannot progress without.

use std::{future::Future, time::Duration};

/// Retries a fallible asynchronous operation a bounded number of times, waiting a fixed delay
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Retry {
    /// The total amount of attempts, at least one attempt is always made.
    pub(crate) max_attempts: usize,
    /// The delay between two attempts.
    pub(crate) delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(1) }
    }
}

impl Retry {
    /// Returns a new [`Retry`].
    pub(crate) const fn new(max_attempts: usize, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Runs the operation until it succeeds or the attempts are exhausted, returning the last
    /// error in the latter case.
    pub(crate) async fn retry<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt >= max_attempts => {
                    tracing::error!(target: "l1_sync::workers", operation = operation_name, %error, attempt, "giving up");
                    return Err(error);
                }
                Err(error) => {
                    tracing::debug!(target: "l1_sync::workers", operation = operation_name, %error, attempt, remaining = max_attempts - attempt, "retrying");
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Retry;
    use std::{cell::Cell, time::Duration};

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = Cell::new(0);
        let retry = Retry::new(5, Duration::from_millis(1));

        let result = retry
            .retry("test", |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err("failed")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let calls = Cell::new(0);
        let retry = Retry::new(2, Duration::from_millis(1));

        let result: Result<(), _> = retry
            .retry("test", |_| {
                calls.set(calls.get() + 1);
                async { Err("always fails") }
            })
            .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = Cell::new(0);
        let retry = Retry::new(0, Duration::from_millis(1));

        let _ = retry
            .retry("test", |_| {
                calls.set(calls.get() + 1);
                async { Err::<(), _>("fails") }
            })
            .await;

        assert_eq!(calls.get(), 1);
    }
}

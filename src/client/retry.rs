use std::future::Future;

use log::debug;

use crate::{Error, Result};

/// Bounded automatic retry of transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub budget: u32,
    pub classify: fn(&Error) -> bool,
}

impl RetryPolicy {
    pub fn new(budget: u32) -> Self {
        RetryPolicy {
            budget,
            classify: Error::is_retryable,
        }
    }

    pub fn with_classifier(mut self, classify: fn(&Error) -> bool) -> Self {
        self.classify = classify;
        self
    }
}

/// Run `operation` until it succeeds, fails with an error `policy` does not
/// consider retryable, or the budget is spent. The closure receives the
/// zero-based attempt number.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.budget && (policy.classify)(&error) => {
                attempt += 1;
                debug!("{label} failed ({error}), attempt {attempt}/{}", policy.budget);
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::BleError;

    fn timeout() -> Error {
        BleError::Timeout {
            request: "write".into(),
            after: Duration::from_secs(1),
        }
        .into()
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(RetryPolicy::new(5), "write", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { if attempt < 3 { Err(timeout()) } else { Ok(attempt) } }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(RetryPolicy::new(2), "read", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(timeout()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn programming_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(RetryPolicy::new(5), "read", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::UnknownService("clock".into())) }
        })
        .await;

        assert_eq!(result, Err(Error::UnknownService("clock".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn adapter_unavailable_is_fatal() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(RetryPolicy::new(5), "read", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BleError::AdapterUnavailable.into()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_classifier() {
        let policy = RetryPolicy::new(1).with_classifier(|_| true);
        let calls = AtomicU32::new(0);
        let _: Result<()> = retry(policy, "read", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::UnknownService("clock".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

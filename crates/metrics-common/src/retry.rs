// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-schedule retry engine.
//!
//! An operation is attempted once per entry in the policy's delay schedule, waiting that entry's
//! delay before the attempt. The default schedule is `[0s, 1s, 3s, 5s]`, so a call that keeps
//! failing is abandoned after four attempts and nine seconds of waiting. Errors the caller
//! classifies as non-retriable end the loop immediately.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

const DEFAULT_DELAYS_SECS: [u64; 4] = [0, 1, 3, 5];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delays: DEFAULT_DELAYS_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from an explicit schedule. An empty schedule still yields one attempt.
    pub fn new(mut delays: Vec<Duration>) -> Self {
        if delays.is_empty() {
            delays.push(Duration::ZERO);
        }
        RetryPolicy { delays }
    }

    /// `attempts` attempts with no waiting in between.
    pub fn immediate(attempts: usize) -> Self {
        RetryPolicy::new(vec![Duration::ZERO; attempts])
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }
}

/// Runs `operation` under `policy`, returning the first success or the last error.
///
/// `label` names the operation in log lines.
pub async fn with_retry<T, E, F, Fut, R>(
    label: &str,
    policy: &RetryPolicy,
    is_retriable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let attempts = policy.delays.len();
    let mut attempt = 0;
    loop {
        let delay = policy.delays.get(attempt).copied().unwrap_or_default();
        attempt += 1;
        if !delay.is_zero() {
            debug!("{label}: waiting {delay:?} before attempt {attempt}/{attempts}");
            tokio::time::sleep(delay).await;
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retriable(&err) {
            return Err(err);
        }
        if attempt >= attempts {
            error!("{label}: giving up after {attempts} attempts: {err}");
            return Err(err);
        }
        warn!("{label}: attempt {attempt}/{attempts} failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => f.write_str("transient"),
                TestError::Fatal => f.write_str("fatal"),
            }
        }
    }

    fn retriable(err: &TestError) -> bool {
        *err == TestError::Transient
    }

    /// An operation that fails `failures` times with `error` and then succeeds.
    fn flaky(
        calls: &AtomicUsize,
        failures: usize,
        error: fn() -> TestError,
    ) -> impl FnMut() -> std::future::Ready<Result<usize, TestError>> + '_ {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= failures {
                std::future::ready(Err(error()))
            } else {
                std::future::ready(Ok(call))
            }
        }
    }

    #[test]
    fn test_default_schedule() {
        assert_eq!(RetryPolicy::default().attempts(), 4);
        assert_eq!(RetryPolicy::new(vec![]).attempts(), 1);
    }

    #[tokio::test]
    async fn test_non_retriable_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(
            "op",
            &RetryPolicy::immediate(4),
            retriable,
            flaky(&calls, 10, || TestError::Fatal),
        )
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(
            "op",
            &RetryPolicy::immediate(4),
            retriable,
            flaky(&calls, 2, || TestError::Transient),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(
            "send batch",
            &RetryPolicy::immediate(4),
            retriable,
            flaky(&calls, 5, || TestError::Transient),
        )
        .await;

        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(logs_contain("send batch: attempt 1/4 failed: transient"));
        assert!(logs_contain("send batch: giving up after 4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_schedule_waits_between_attempts() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result = with_retry(
            "op",
            &RetryPolicy::default(),
            retriable,
            flaky(&calls, 3, || TestError::Transient),
        )
        .await;

        assert_eq!(result, Ok(4));
        assert!(started.elapsed() >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_is_immediate() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result = with_retry(
            "op",
            &RetryPolicy::default(),
            retriable,
            flaky(&calls, 0, || TestError::Transient),
        )
        .await;

        assert_eq!(result, Ok(1));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

use std::{thread, time::Duration};

use tracing::warn;

use crate::{backend::ApiError, telemetry};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Fixed-delay retry for low-volume provisioning calls.
///
/// `max_attempts` counts every invocation including the first one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Invoke `call` until it succeeds or the attempts run out, returning the last error.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                thread::sleep(self.delay);
            }
            match call() {
                Ok(value) => {
                    telemetry::emit_attempt_succeeded(operation, attempt);
                    return Ok(value);
                }
                Err(err) => {
                    telemetry::emit_attempt_failed(operation, attempt, &err);
                    if attempt < self.max_attempts {
                        warn!(
                            target: "aad.provision",
                            operation,
                            attempt,
                            retryable = err.is_retryable(),
                            error = %err,
                            "remote call failed; retrying after {}ms",
                            self.delay.as_millis()
                        );
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ApiError::RetryLimit {
            operation: operation.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn failing_then_ok(failures: u32, calls: &Cell<u32>) -> Result<&'static str, ApiError> {
        calls.set(calls.get() + 1);
        if calls.get() <= failures {
            Err(ApiError::InvalidResponse(format!("failure {}", calls.get())))
        } else {
            Ok("done")
        }
    }

    #[test]
    fn two_attempts_do_not_cover_two_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = policy
            .run("createAadApp", || failing_then_ok(2, &calls))
            .expect_err("exhausted");
        assert_eq!(calls.get(), 2);
        assert!(matches!(err, ApiError::InvalidResponse(msg) if msg == "failure 2"));
    }

    #[test]
    fn three_attempts_cover_two_failures() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert_eq!(
            policy.run("createAadApp", || failing_then_ok(2, &calls)).unwrap(),
            "done"
        );
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn zero_attempts_yield_retry_limit() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let err = policy
            .run("getAadApp", || Ok::<_, ApiError>(()))
            .expect_err("no attempts");
        assert!(matches!(err, ApiError::RetryLimit { operation } if operation == "getAadApp"));
    }

    #[traced_test]
    #[test]
    fn every_attempt_is_reported() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        policy
            .run("updateAadApp", || failing_then_ok(1, &calls))
            .unwrap();

        assert!(logs_contain("method_name=\"updateAadApp\""));
        assert!(logs_contain("retry_times=1"));
        assert!(logs_contain("retry_times=2"));
        assert!(logs_contain("remote call succeeded"));
        assert!(logs_contain("remote call failed; retrying after 0ms"));
        assert!(logs_contain("operation=\"updateAadApp\""));
        assert!(logs_contain("attempt=1"));
        assert!(!logs_contain("attempt=2"));
    }
}

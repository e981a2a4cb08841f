//! Rate-limit retry/backoff policy and operational hook contracts.

use std::future::Future;
use std::time::Duration;

use crate::{GatewayError, GatewayErrorKind};

/// Bounded exponential backoff. `max_attempts` counts the first call, so the
/// default of 4 means three retries after the initial attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    pub fn should_retry(&self, attempt: u32, error: &GatewayError) -> bool {
        error.retryable && attempt < self.max_attempts
    }

    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = (attempt.saturating_sub(1)) as i32;
        let unbounded = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(unbounded.min(self.max_backoff.as_secs_f64()))
    }
}

pub trait GatewayOperationHooks: Send + Sync {
    fn on_attempt_start(&self, _provider: &str, _operation: &str, _attempt: u32) {}

    fn on_retry_scheduled(
        &self,
        _provider: &str,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &GatewayError,
    ) {
    }

    fn on_success(&self, _provider: &str, _operation: &str, _attempts: u32) {}

    fn on_failure(&self, _provider: &str, _operation: &str, _attempts: u32, _error: &GatewayError) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOperationHooks;

impl GatewayOperationHooks for NoopOperationHooks {}

pub async fn execute_with_retry<T, Op, OpFuture, Sleep, SleepFuture>(
    provider: &str,
    operation: &str,
    policy: &RetryPolicy,
    hooks: &dyn GatewayOperationHooks,
    mut execute: Op,
    mut sleep: Sleep,
) -> Result<T, GatewayError>
where
    Op: FnMut(u32) -> OpFuture,
    OpFuture: Future<Output = Result<T, GatewayError>>,
    Sleep: FnMut(Duration) -> SleepFuture,
    SleepFuture: Future<Output = ()>,
{
    let mut attempt = 1;

    loop {
        hooks.on_attempt_start(provider, operation, attempt);

        match execute(attempt).await {
            Ok(value) => {
                hooks.on_success(provider, operation, attempt);
                return Ok(value);
            }
            Err(error) => {
                if policy.should_retry(attempt, &error) {
                    let delay = policy.backoff_for_attempt(attempt);
                    hooks.on_retry_scheduled(provider, operation, attempt, delay, &error);
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                let error = if error.kind == GatewayErrorKind::RateLimitExceeded && attempt > 1 {
                    GatewayError::rate_limited(format!(
                        "rate limit exceeded after {} retries: {}",
                        attempt - 1,
                        error.message
                    ))
                } else {
                    error
                };

                hooks.on_failure(provider, operation, attempt, &error);
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn default_policy_allows_three_retries_after_the_first_attempt() {
        let policy = RetryPolicy::default();
        let throttled = GatewayError::rate_limited("slow down");

        assert_eq!(policy.max_retries(), 3);
        assert!(policy.should_retry(1, &throttled));
        assert!(policy.should_retry(3, &throttled));
        assert!(!policy.should_retry(4, &throttled));
    }

    #[test]
    fn non_rate_limit_errors_are_never_retried() {
        let policy = RetryPolicy::default();

        assert!(!policy.should_retry(1, &GatewayError::permission_denied("no")));
        assert!(!policy.should_retry(1, &GatewayError::invalid_request("bad")));
        assert!(!policy.should_retry(1, &GatewayError::timeout("slow")));
        assert!(!policy.should_retry(1, &GatewayError::provider("boom")));
    }

    #[test]
    fn backoff_starts_at_one_second_and_doubles() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(250));
        assert_eq!(policy.backoff_for_attempt(6), Duration::from_millis(250));
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl GatewayOperationHooks for RecordingHooks {
        fn on_attempt_start(&self, provider: &str, operation: &str, attempt: u32) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("start:{provider}:{operation}:{attempt}"));
        }

        fn on_retry_scheduled(
            &self,
            provider: &str,
            operation: &str,
            attempt: u32,
            _delay: Duration,
            _error: &GatewayError,
        ) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("retry:{provider}:{operation}:{attempt}"));
        }

        fn on_success(&self, provider: &str, operation: &str, attempts: u32) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("success:{provider}:{operation}:{attempts}"));
        }

        fn on_failure(&self, provider: &str, operation: &str, attempts: u32, error: &GatewayError) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("failure:{provider}:{operation}:{attempts}:{}", error.kind));
        }
    }

    #[tokio::test]
    async fn execute_with_retry_recovers_from_rate_limits_under_the_bound() {
        let policy = RetryPolicy::default();
        let hooks = RecordingHooks::default();
        let attempts = Arc::new(Mutex::new(0_u32));
        let sleeps = Arc::new(Mutex::new(Vec::new()));

        let result = execute_with_retry(
            "fake",
            "converse",
            &policy,
            &hooks,
            {
                let attempts = Arc::clone(&attempts);
                move |attempt| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        *attempts.lock().expect("attempts lock") = attempt;
                        if attempt < 4 {
                            Err(GatewayError::rate_limited("throttled"))
                        } else {
                            Ok("ok")
                        }
                    }
                }
            },
            {
                let sleeps = Arc::clone(&sleeps);
                move |delay| {
                    let sleeps = Arc::clone(&sleeps);
                    async move {
                        sleeps.lock().expect("sleep lock").push(delay);
                    }
                }
            },
        )
        .await;

        assert_eq!(result.expect("result should succeed"), "ok");
        assert_eq!(*attempts.lock().expect("attempts lock"), 4);
        assert_eq!(
            *sleeps.lock().expect("sleep lock"),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );

        let events = hooks.events.lock().expect("events lock").clone();
        assert!(events.contains(&"success:fake:converse:4".to_string()));
    }

    #[tokio::test]
    async fn execute_with_retry_surfaces_rate_limit_after_exhaustion() {
        let policy = RetryPolicy::default();
        let hooks = RecordingHooks::default();
        let calls = Arc::new(Mutex::new(0_u32));

        let result = execute_with_retry::<(), _, _, _, _>(
            "fake",
            "converse",
            &policy,
            &hooks,
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    let calls = Arc::clone(&calls);
                    async move {
                        *calls.lock().expect("calls lock") += 1;
                        Err(GatewayError::rate_limited("throttled"))
                    }
                }
            },
            |_| async move {},
        )
        .await;

        let error = result.expect_err("result should fail");
        assert_eq!(error.kind, GatewayErrorKind::RateLimitExceeded);
        assert!(error.message.contains("after 3 retries"));
        assert_eq!(*calls.lock().expect("calls lock"), 4);

        let events = hooks.events.lock().expect("events lock").clone();
        assert!(events.contains(&"failure:fake:converse:4:rate_limit_exceeded".to_string()));
    }

    #[tokio::test]
    async fn execute_with_retry_stops_on_non_retryable_error() {
        let policy = RetryPolicy::default();
        let hooks = RecordingHooks::default();

        let result = execute_with_retry::<(), _, _, _, _>(
            "fake",
            "converse",
            &policy,
            &hooks,
            |_| async move { Err(GatewayError::permission_denied("no access")) },
            |_| async move {},
        )
        .await;

        let error = result.expect_err("result should fail");
        assert_eq!(error.kind, GatewayErrorKind::PermissionDenied);
        let events = hooks.events.lock().expect("events lock").clone();
        assert!(events.iter().any(|item| item.contains("failure:fake:converse:1")));
        assert!(!events.iter().any(|item| item.starts_with("retry:")));
    }
}

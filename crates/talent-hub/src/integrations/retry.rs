use std::future::Future;
use std::time::Duration;

use crate::config::HubConfig;

use super::error::ConnectorError;

const MAX_PROVIDER_WAIT: Duration = Duration::from_secs(30);

/// Whether repeating a call could apply its side effect twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Reads and probes: any transient failure is retried.
    Idempotent,
    /// Bookings and sends: retried only when the provider throttled the request.
    SideEffecting,
}

/// Timeout and bounded retry applied around every connector call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            timeout: config.call_timeout,
            attempts: config.retry_attempts,
            backoff: config.retry_backoff,
        }
    }

    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        kind: CallKind,
        mut call: F,
    ) -> Result<T, ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ConnectorError::Timeout(self.timeout)),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= attempts || !retryable(&err, kind) {
                return Err(err);
            }

            let delay = self.delay(attempt, &err);
            tracing::debug!(operation, attempt, error = %err, ?delay, "retrying connector call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn delay(&self, attempt: u32, err: &ConnectorError) -> Duration {
        match err {
            ConnectorError::Throttled {
                retry_after: Some(wait),
            } => (*wait).min(MAX_PROVIDER_WAIT),
            _ => self
                .backoff
                .saturating_mul(1u32 << (attempt - 1).min(16)),
        }
    }
}

fn retryable(err: &ConnectorError, kind: CallKind) -> bool {
    match kind {
        CallKind::Idempotent => err.is_transient(),
        CallKind::SideEffecting => matches!(err, ConnectorError::Throttled { .. }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(50),
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome = policy(3)
            .run("get_candidates", CallKind::Idempotent, move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ConnectorError::Unavailable("503".to_string()))
                } else {
                    Ok("records")
                }
            })
            .await;
        assert_eq!(outcome, Ok("records"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Result<(), _> = policy(2)
            .run("get_jobs", CallKind::Idempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ConnectorError::Unavailable("502".to_string()))
            })
            .await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Result<(), _> = policy(3)
            .run("get_jobs", CallKind::Idempotent, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ConnectorError::Authentication(401))
            })
            .await;
        assert_eq!(outcome, Err(ConnectorError::Authentication(401)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn side_effecting_calls_retry_only_when_throttled() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Result<(), _> = policy(3)
            .run("send_email", CallKind::SideEffecting, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ConnectorError::Unavailable("504".to_string()))
            })
            .await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let throttled = AtomicU32::new(0);
        let throttle_counter = &throttled;
        let outcome = policy(3)
            .run("send_email", CallKind::SideEffecting, move || async move {
                if throttle_counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ConnectorError::Throttled {
                        retry_after: Some(Duration::from_millis(1)),
                    })
                } else {
                    Ok(())
                }
            })
            .await;
        assert_eq!(outcome, Ok(()));
        assert_eq!(throttled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let outcome: Result<(), _> = policy(1)
            .run("get_availability", CallKind::Idempotent, move || async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(outcome, Err(ConnectorError::Timeout(Duration::from_millis(50))));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = CallPolicy {
            timeout: Duration::from_secs(1),
            attempts: 5,
            backoff: Duration::from_millis(100),
        };
        let err = ConnectorError::Unavailable("503".to_string());
        assert_eq!(policy.delay(1, &err), Duration::from_millis(100));
        assert_eq!(policy.delay(3, &err), Duration::from_millis(400));
    }
}

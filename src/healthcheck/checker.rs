use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Readiness check for a dependency.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Check if the target is ready
    async fn check(&self) -> Result<bool>;

    /// Upper bound for a single check
    fn timeout(&self) -> Duration;

    /// Short label for log lines, e.g. `exec pg_isready`
    fn describe(&self) -> String;
}

/// Run `checker` up to `max_attempts` times, `interval` apart.
///
/// The interval is fixed. A check that errors or outlives
/// [`HealthChecker::timeout`] counts as "not ready". Returns false once
/// attempts are exhausted; a zero bound never checks.
pub async fn check_with_retry<C: HealthChecker + ?Sized>(
    checker: &C,
    max_attempts: u32,
    interval: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        match timeout(checker.timeout(), checker.check()).await {
            Ok(Ok(true)) => {
                tracing::debug!(
                    "{} ready after {}/{} attempts",
                    checker.describe(),
                    attempt,
                    max_attempts
                );
                return true;
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                tracing::debug!("{} attempt {} errored: {}", checker.describe(), attempt, e)
            }
            Err(_) => tracing::debug!(
                "{} attempt {} timed out after {:?}",
                checker.describe(),
                attempt,
                checker.timeout()
            ),
        }
        // Don't sleep after the last attempt
        if attempt < max_attempts {
            sleep(interval).await;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Countdown {
        calls: AtomicU32,
        ready_on: u32,
    }

    #[async_trait]
    impl HealthChecker for Countdown {
        async fn check(&self) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                return Err(Error::Process("first probe errors".to_string()));
            }
            Ok(n >= self.ready_on)
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn describe(&self) -> String {
            "countdown".to_string()
        }
    }

    #[tokio::test]
    async fn succeeds_once_ready() {
        let c = Countdown {
            calls: AtomicU32::new(0),
            ready_on: 3,
        };
        assert!(check_with_retry(&c, 5, Duration::from_millis(1)).await);
        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bound() {
        let c = Countdown {
            calls: AtomicU32::new(0),
            ready_on: 100,
        };
        assert!(!check_with_retry(&c, 4, Duration::from_millis(1)).await);
        assert_eq!(c.calls.load(Ordering::SeqCst), 4);
    }

    struct Hangs {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthChecker for Hangs {
        async fn check(&self) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_secs(30)).await;
            Ok(true)
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }

        fn describe(&self) -> String {
            "hangs".to_string()
        }
    }

    #[tokio::test]
    async fn hung_check_is_cut_off_and_counts_as_not_ready() {
        let c = Hangs {
            calls: AtomicU32::new(0),
        };
        let start = std::time::Instant::now();
        assert!(!check_with_retry(&c, 3, Duration::from_millis(1)).await);
        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn zero_attempts_never_checks() {
        let c = Countdown {
            calls: AtomicU32::new(0),
            ready_on: 1,
        };
        assert!(!check_with_retry(&c, 0, Duration::from_millis(1)).await);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }
}

//! Container runtime CLI access.
//!
//! [`DockerClient`] wraps the `docker` binary; [`DockerError`] is its
//! structured error. The container manager reaches the client through the
//! [`crate::container::ContainerRuntime`] trait.

pub mod client;
pub mod error;

pub use client::{DockerClient, RunSpec};
pub use error::DockerError;

use std::time::Duration;

/// Check the runtime with retry and exponential backoff.
///
/// A daemon that is still booting answers `info` late; one failed probe is
/// not enough to declare the runtime absent and fall back.
pub async fn check_daemon_with_retry(
    client: &DockerClient,
    max_attempts: u32,
    total_timeout: Duration,
) -> bool {
    use tokio::time::{sleep, timeout};

    let start = std::time::Instant::now();
    let mut delay = Duration::from_millis(100);

    for attempt in 1..=max_attempts {
        if start.elapsed() >= total_timeout {
            tracing::debug!(
                "Container daemon health check timeout after {:?}",
                start.elapsed()
            );
            return false;
        }

        let remaining = total_timeout.saturating_sub(start.elapsed());
        match timeout(remaining, client.daemon_healthy(remaining)).await {
            Ok(true) => {
                if attempt > 1 {
                    tracing::info!(
                        "Container daemon became healthy after {} attempts ({:?})",
                        attempt,
                        start.elapsed()
                    );
                }
                return true;
            }
            Ok(false) | Err(_) => {
                if attempt < max_attempts {
                    tracing::debug!(
                        "Container daemon check {}/{} failed, retrying in {:?}",
                        attempt,
                        max_attempts,
                        delay
                    );
                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(2));
                } else {
                    tracing::warn!(
                        "Container daemon unhealthy after {} attempts ({:?})",
                        max_attempts,
                        start.elapsed()
                    );
                }
            }
        }
    }

    false
}

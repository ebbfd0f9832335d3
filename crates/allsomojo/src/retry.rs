//! Waiting out hosting-service throttling.
//!
//! A throttled request is retried after a long constant pause rather than an
//! exponential backoff: GitHub's secondary limits clear on the order of
//! minutes, and hammering sooner only extends them.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::platform::{PlatformError, short_error_message};

/// Pause after a throttled request.
pub const DEFAULT_THROTTLE_PAUSE: Duration = Duration::from_secs(30 * 60);

/// Throttled attempts retried before giving up on the call.
pub const DEFAULT_MAX_THROTTLE_RETRIES: usize = 3;

/// Configuration for throttle retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleRetry {
    pub pause: Duration,
    pub max_retries: usize,
}

impl Default for ThrottleRetry {
    fn default() -> Self {
        Self {
            pause: DEFAULT_THROTTLE_PAUSE,
            max_retries: DEFAULT_MAX_THROTTLE_RETRIES,
        }
    }
}

impl ThrottleRetry {
    #[must_use]
    pub fn new(pause: Duration, max_retries: usize) -> Self {
        Self { pause, max_retries }
    }

    #[must_use]
    pub fn into_backoff(self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.pause)
            .with_max_times(self.max_retries)
    }
}

/// Run `operation`, retrying only when it fails with a throttling error.
///
/// Any other error is returned immediately. `label` identifies the call in
/// log lines (usually the query or repository name).
///
/// # Example
///
/// ```ignore
/// let page = with_throttle_retry(
///     || client.search_repositories(&query, page, 100),
///     &ThrottleRetry::default(),
///     &query,
/// )
/// .await?;
/// ```
pub async fn with_throttle_retry<T, F, Fut>(
    mut operation: F,
    config: &ThrottleRetry,
    label: &str,
) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.clone().into_backoff())
        .notify(|err, dur| {
            tracing::warn!(
                label,
                attempt = attempt.load(Ordering::SeqCst),
                pause_secs = dur.as_secs(),
                error = %short_error_message(err),
                "throttled by hosting service, pausing"
            );
        })
        .when(PlatformError::is_throttled)
        .await
}

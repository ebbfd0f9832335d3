use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::types::RateLimitInfo;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Proactive request pacing.
///
/// GitHub's search API allows 30 requests per minute for authenticated
/// callers; pacing below that keeps the reactive quota wait rare.
///
/// # Example
///
/// ```ignore
/// let limiter = ApiRateLimiter::per_minute(30);
/// limiter.wait().await;
/// client.search_repositories(q, 1, 100).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// A limiter allowing `requests_per_minute` (treated as 1 if zero).
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_minute(rpm))),
        }
    }

    /// Wait until a request is allowed.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// How long to pause before the next request, given the last quota report.
///
/// Returns `None` while quota remains. Once it is exhausted the pause runs
/// until `reset_at + margin`, or just `margin` if the reset is already past.
pub fn quota_pause(info: &RateLimitInfo, now: DateTime<Utc>, margin: Duration) -> Option<Duration> {
    if !info.is_exhausted() {
        return None;
    }
    let until_reset = (info.reset_at - now).to_std().unwrap_or(Duration::ZERO);
    Some(until_reset + margin)
}

/// Sleep through an exhausted quota window.
pub async fn wait_for_quota(info: &RateLimitInfo, margin: Duration) {
    if let Some(pause) = quota_pause(info, Utc::now(), margin) {
        tracing::info!(
            reset_at = %info.reset_at,
            pause_secs = pause.as_secs(),
            "search quota exhausted, waiting for reset"
        );
        tokio::time::sleep(pause).await;
    }
}

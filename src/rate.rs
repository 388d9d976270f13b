use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota};

/// Token bucket shared by every request loop. The first request goes out
/// immediately; each following one waits until `period` has elapsed.
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn every(period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(NonZeroU32::MIN);

        Self {
            inner: governor::RateLimiter::direct(quota),
        }
    }

    pub async fn until_ready(&self) {
        self.inner.until_ready().await;
    }
}

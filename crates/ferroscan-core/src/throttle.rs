use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared request budget for providers with a per-minute plan limit.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    per_minute: u32,
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("per_minute", &self.per_minute)
            .finish()
    }
}

impl RequestThrottle {
    /// Budget of `limit` requests per minute; bursts up to the full limit.
    pub fn per_minute(limit: u32) -> Self {
        let quota = quota_from_window(Duration::from_secs(60), limit);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            per_minute: limit.max(1),
        }
    }

    pub const fn limit(&self) -> u32 {
        self.per_minute
    }

    /// Waits until one request fits in the budget.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Takes one request from the budget without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit.max(1)).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_burst_then_refuses() {
        let throttle = RequestThrottle::per_minute(2);

        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        let throttle = RequestThrottle::per_minute(0);
        assert_eq!(throttle.limit(), 1);
        assert!(throttle.try_acquire());
    }

    #[tokio::test]
    async fn wait_returns_immediately_within_budget() {
        let throttle = RequestThrottle::per_minute(600);
        tokio::time::timeout(Duration::from_millis(500), throttle.wait())
            .await
            .expect("budget available");
    }
}

use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{QuantaClock, QuantaInstant},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// A person clicking through the portal never gets near this.
const REQ_PER_SEC: NonZeroU32 = nonzero!(4u32);

type SpecificGovernorRateLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

/// Spaces out the requests of one session so the legacy portal sees
/// browser-like traffic.
pub struct RateLimiter {
    req_per_sec: SpecificGovernorRateLimiter,
    // None when the configured gap is zero.
    min_gap: Option<SpecificGovernorRateLimiter>,
}

impl RateLimiter {
    pub fn new(min_request_gap: Duration) -> Self {
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(REQ_PER_SEC));
        let min_gap = Quota::with_period(min_request_gap).map(GovernorRateLimiter::direct);

        RateLimiter {
            req_per_sec,
            min_gap,
        }
    }

    pub async fn wait_until_ready(&self) {
        // Per-second cap first, then the gap: the gap limiter lets exactly one
        // caller through per period, so it has to be the last hurdle.
        self.req_per_sec.until_ready().await;
        if let Some(min_gap) = &self.min_gap {
            min_gap.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn zero_gap_only_applies_the_burst_cap() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let started = Instant::now();
        for _ in 0..REQ_PER_SEC.get() {
            limiter.wait_until_ready().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn gap_spaces_consecutive_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let started = Instant::now();
        limiter.wait_until_ready().await;
        limiter.wait_until_ready().await;
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}

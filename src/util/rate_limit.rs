//! Chat rate limiting

use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiter keyed by lowercased chat sender
pub type SenderLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

fn quota(per_second: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN))
}

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    Arc::new(RateLimiter::direct(quota(requests_per_second)))
}

/// Frames a single WebSocket bridge connection may send per second
pub const BRIDGE_RATE_LIMIT: u32 = 50;

/// Per-sender chat limiter shared by every bridge connection
#[derive(Clone)]
pub struct ChatRateLimiter {
    senders: Arc<SenderLimiter>,
}

impl ChatRateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            senders: Arc::new(RateLimiter::keyed(quota(per_second))),
        }
    }

    /// Check if a message from `sender` is allowed (returns true if allowed)
    pub fn check(&self, sender: &str) -> bool {
        self.senders.check_key(&sender.to_lowercase()).is_ok()
    }

    /// Forget idle senders
    pub fn prune(&self) {
        self.senders.retain_recent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn senders_have_separate_budgets() {
        let limiter = ChatRateLimiter::new(2);
        assert!(limiter.check("alice"));
        assert!(limiter.check("Alice"));
        assert!(!limiter.check("ALICE"));
        assert!(limiter.check("bob"));
    }

    #[test]
    fn zero_quota_still_allows_one() {
        let limiter = create_limiter(0);
        assert!(limiter.check().is_ok());
    }
}

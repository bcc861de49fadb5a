//! In-memory action rate limiting
//!
//! Each [`ActionLimiter`] wraps a keyed GCRA limiter from `governor`. A key
//! may perform the action at most `max` times within any `window`; once the
//! burst is spent, one permit comes back per `window`. Keys are independent.
//!
//! State lives in process memory, so limits are per API instance.

use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Too many {action} requests, retry in {retry_after:?}")]
pub struct RateLimited {
    pub action: &'static str,
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds for a `Retry-After` header, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 || secs == 0 {
            secs + 1
        } else {
            secs
        }
    }
}

pub struct ActionLimiter {
    action: &'static str,
    max: u32,
    window: Duration,
    limiter: DefaultKeyedRateLimiter<String>,
}

impl ActionLimiter {
    pub fn new(action: &'static str, max: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window)
            .map(|q| q.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_second(burst));

        Self {
            action,
            max: burst.get(),
            window,
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn per_minute(action: &'static str, max: u32) -> Self {
        Self::new(action, max, Duration::from_secs(60))
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Consumes one permit for `key`.
    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        self.limiter
            .check_key(&key.to_string())
            .map_err(|not_until| {
                let retry_after = not_until.wait_time_from(DefaultClock::default().now());
                tracing::debug!(
                    action = self.action,
                    key = %key,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit hit"
                );
                RateLimited {
                    action: self.action,
                    retry_after,
                }
            })
    }

    /// Drops keys whose state has fully refilled.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

impl std::fmt::Debug for ActionLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLimiter")
            .field("action", &self.action)
            .field("max", &self.max)
            .field("window", &self.window)
            .finish()
    }
}

/// The limiters applied to blog interactions
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub likes: Arc<ActionLimiter>,
    pub views: Arc<ActionLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            likes: Arc::new(ActionLimiter::per_minute("like", config.likes_per_minute)),
            views: Arc::new(ActionLimiter::per_minute("view", config.views_per_minute)),
        }
    }

    /// Periodic housekeeping; call from a background interval.
    pub fn retain_recent(&self) {
        self.likes.retain_recent();
        self.views.retain_recent();
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max() {
        let limiter = ActionLimiter::per_minute("like", 3);
        for _ in 0..3 {
            assert!(limiter.check("user-1").is_ok());
        }

        let err = limiter.check("user-1").unwrap_err();
        assert_eq!(err.action, "like");
        assert!(err.retry_after > Duration::ZERO);
        assert!(err.retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = ActionLimiter::per_minute("view", 1);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_permits_refill() {
        let limiter = ActionLimiter::new("view", 2, Duration::from_millis(100));
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_err());

        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check("k").is_ok());
    }

    #[test]
    fn test_spaced_attempts_capped_within_window() {
        let limiter = ActionLimiter::new("like", 2, Duration::from_millis(200));
        let started = std::time::Instant::now();
        let mut admitted = 0;

        while started.elapsed() < Duration::from_millis(190) {
            if limiter.check("k").is_ok() {
                admitted += 1;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(admitted, 2);
    }

    #[test]
    fn test_zero_max_treated_as_one() {
        let limiter = ActionLimiter::per_minute("like", 0);
        assert_eq!(limiter.max(), 1);
        assert!(limiter.check("k").is_ok());
        assert!(limiter.check("k").is_err());
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        let limited = RateLimited {
            action: "like",
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(limited.retry_after_secs(), 2);

        let immediate = RateLimited {
            action: "like",
            retry_after: Duration::ZERO,
        };
        assert_eq!(immediate.retry_after_secs(), 1);
    }

    #[test]
    fn test_limiters_from_config() {
        let limiters = RateLimiters::from_config(&RateLimitConfig {
            likes_per_minute: 2,
            views_per_minute: 5,
        });
        assert_eq!(limiters.likes.max(), 2);
        assert_eq!(limiters.views.max(), 5);
        limiters.retain_recent();
    }
}

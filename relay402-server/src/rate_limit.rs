//! Fixed-window request caps.
//!
//! Keys are the client's on-chain address when the request carries one,
//! falling back to the peer IP. Windows are per scope: a client can
//! burn its relay budget without losing read access to estimates.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Which cap a request counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
    /// Everything; 100 requests per window.
    General,
    /// `/estimate`; 200 requests per window.
    Estimate,
    /// `/meta/relay` and `/meta/batch`; 30 requests per window.
    Relay,
}

impl RateScope {
    /// Requests allowed per window for this scope.
    #[must_use]
    pub const fn limit(self) -> u32 {
        match self {
            Self::General => 100,
            Self::Estimate => 200,
            Self::Relay => 30,
        }
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// A fixed-window limiter over `(scope, key)` pairs.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<(RateScope, String), Window>,
    window: Duration,
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl FixedWindowLimiter {
    /// Creates a limiter with the given window length.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Counts one request. `Err` carries the seconds until the window
    /// resets, for the 429 `retryAfter` field.
    pub fn check(&self, scope: RateScope, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((scope, key.to_owned()))
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        let elapsed = now.duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= scope.limit() {
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }
        entry.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = FixedWindowLimiter::default();
        for _ in 0..RateScope::Relay.limit() {
            assert!(limiter.check(RateScope::Relay, "0xabc").is_ok());
        }
        let retry_after = limiter.check(RateScope::Relay, "0xabc").unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn scopes_are_independent() {
        let limiter = FixedWindowLimiter::default();
        for _ in 0..RateScope::Relay.limit() {
            limiter.check(RateScope::Relay, "0xabc").unwrap();
        }
        assert!(limiter.check(RateScope::Relay, "0xabc").is_err());
        assert!(limiter.check(RateScope::Estimate, "0xabc").is_ok());
        assert!(limiter.check(RateScope::General, "0xabc").is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowLimiter::default();
        for _ in 0..RateScope::Relay.limit() {
            limiter.check(RateScope::Relay, "0xabc").unwrap();
        }
        assert!(limiter.check(RateScope::Relay, "0xabc").is_err());
        assert!(limiter.check(RateScope::Relay, "0xdef").is_ok());
    }

    #[test]
    fn window_resets() {
        let limiter = FixedWindowLimiter::new(Duration::from_millis(10));
        for _ in 0..RateScope::Relay.limit() {
            limiter.check(RateScope::Relay, "0xabc").unwrap();
        }
        assert!(limiter.check(RateScope::Relay, "0xabc").is_err());
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check(RateScope::Relay, "0xabc").is_ok());
    }
}

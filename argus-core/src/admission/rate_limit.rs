//! Per-account request-rate limiting for the admission path.
//!
//! Sliding window log: each account keeps the timestamps of its recent
//! submissions; the per-key lock is scoped to the prune-check-push of one
//! window and is never held across any other component's call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use argus_model::AccountId;

/// Limit of `limit` submissions per `window`, per account.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    policy: RateLimitPolicy,
    windows: Arc<DashMap<AccountId, Mutex<VecDeque<Instant>>>>,
}

impl SlidingWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Record one submission attempt. `Ok` admits and counts the request;
    /// `Err` carries the wait until the window frees a slot. A rejected
    /// request is not counted against the caller.
    pub fn check(&self, account_id: AccountId) -> Result<(), Duration> {
        self.check_at(account_id, Instant::now())
    }

    fn check_at(
        &self,
        account_id: AccountId,
        now: Instant,
    ) -> Result<(), Duration> {
        let entry = self
            .windows
            .entry(account_id)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut timestamps = entry.lock();

        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.policy.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < self.policy.limit as usize {
            timestamps.push_back(now);
            Ok(())
        } else {
            let retry_after = timestamps
                .front()
                .map(|oldest| {
                    self.policy
                        .window
                        .saturating_sub(now.duration_since(*oldest))
                })
                .unwrap_or(self.policy.window);
            Err(retry_after)
        }
    }

    /// Drop windows with no activity inside the current window. Called
    /// opportunistically; correctness does not depend on it.
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows.retain(|_, timestamps| {
            let timestamps = timestamps.lock();
            timestamps
                .back()
                .map(|t| now.duration_since(*t) < self.policy.window)
                .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window: Duration) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimitPolicy { limit, window })
    }

    #[test]
    fn requests_within_limit_are_admitted() {
        let limiter = limiter(3, Duration::from_secs(60));
        let account = AccountId::new();

        for i in 1..=3 {
            assert!(
                limiter.check(account).is_ok(),
                "request {} should be allowed",
                i
            );
        }
        assert!(limiter.check(account).is_err(), "request 4 should be denied");
    }

    #[test]
    fn window_expiry_frees_slots() {
        let limiter = limiter(2, Duration::from_millis(50));
        let account = AccountId::new();
        let start = Instant::now();

        assert!(limiter.check_at(account, start).is_ok());
        assert!(limiter.check_at(account, start).is_ok());
        assert!(limiter.check_at(account, start).is_err());

        let later = start + Duration::from_millis(60);
        assert!(limiter.check_at(account, later).is_ok());
    }

    #[test]
    fn accounts_are_limited_independently() {
        let limiter = limiter(1, Duration::from_secs(60));
        let first = AccountId::new();
        let second = AccountId::new();

        assert!(limiter.check(first).is_ok());
        assert!(limiter.check(first).is_err());
        assert!(limiter.check(second).is_ok());
    }

    #[test]
    fn retry_after_counts_down_to_window_edge() {
        let limiter = limiter(1, Duration::from_secs(60));
        let account = AccountId::new();
        let start = Instant::now();

        assert!(limiter.check_at(account, start).is_ok());
        let retry_after = limiter
            .check_at(account, start + Duration::from_secs(10))
            .unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(50));
    }

    #[test]
    fn rejected_requests_are_not_counted() {
        let limiter = limiter(1, Duration::from_millis(100));
        let account = AccountId::new();
        let start = Instant::now();

        assert!(limiter.check_at(account, start).is_ok());
        // Hammering while limited must not extend the lockout.
        for i in 1..5 {
            let at = start + Duration::from_millis(i * 10);
            assert!(limiter.check_at(account, at).is_err());
        }
        let after_window = start + Duration::from_millis(110);
        assert!(limiter.check_at(account, after_window).is_ok());
    }

    #[test]
    fn prune_drops_idle_windows() {
        let limiter = limiter(5, Duration::from_millis(1));
        let account = AccountId::new();
        assert!(limiter.check(account).is_ok());
        std::thread::sleep(Duration::from_millis(5));
        limiter.prune();
        assert!(limiter.windows.is_empty());
    }
}

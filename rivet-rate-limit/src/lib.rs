use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rivet_core::{BoxFuture, RateLimitDecision, RateLimitStore};
use tracing::debug;

/// Exact sliding-window limiter.
///
/// Each key keeps the instants of its accepted hits. A hit is allowed when
/// fewer than `max` of them fall inside the trailing `window`; rejected hits
/// are not recorded, so a client hammering a closed window does not extend
/// its own lockout.
#[derive(Clone, Default)]
pub struct SlidingWindowLimiter {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit for `key` as of `now`.
    pub fn hit_at(&self, key: &str, max: u64, window: Duration, now: Instant) -> RateLimitDecision {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        let log = entry.value_mut();
        while let Some(&oldest) = log.front() {
            if now.saturating_duration_since(oldest) >= window {
                log.pop_front();
            } else {
                break;
            }
        }

        let allowed = (log.len() as u64) < max;
        if allowed {
            log.push_back(now);
        }
        let reset_after = log
            .front()
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(window);

        RateLimitDecision {
            allowed,
            limit: max,
            remaining: max.saturating_sub(log.len() as u64),
            reset_after,
        }
    }

    /// Drop keys whose every hit is older than `window`.
    pub fn purge_expired(&self, window: Duration) {
        self.purge_expired_at(window, Instant::now());
    }

    fn purge_expired_at(&self, window: Duration, now: Instant) {
        let before = self.hits.len();
        self.hits.retain(|_, log| {
            log.back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < window)
        });
        debug!(removed = before.saturating_sub(self.hits.len()), "Purged idle rate-limit keys");
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

impl RateLimitStore for SlidingWindowLimiter {
    fn hit<'a>(
        &'a self,
        key: &'a str,
        max: u64,
        window: Duration,
    ) -> BoxFuture<'a, RateLimitDecision> {
        let decision = self.hit_at(key, max, window, Instant::now());
        Box::pin(std::future::ready(decision))
    }
}

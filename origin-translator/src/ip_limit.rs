//! Per-IP fingerprint rate limit with a short temp-ban after repeated
//! violations. In-process only -- the origin runs as a single instance
//! behind the edge, so there is no need for a shared backend here, unlike
//! the edge's per-key daily quota.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const VIOLATION_THRESHOLD: u32 = 5;
const VIOLATION_WINDOW: Duration = Duration::from_secs(300);
const BAN_DURATION: Duration = Duration::from_secs(600);
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    RateLimited,
    Banned,
}

struct IpState {
    window_start: Instant,
    count: u32,
    violations: Vec<Instant>,
    banned_until: Option<Instant>,
}

pub struct IpRateLimiter {
    inner: Mutex<HashMap<String, IpState>>,
    per_min: u32,
}

impl IpRateLimiter {
    pub fn new(per_min: u32) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            per_min,
        }
    }

    pub fn check(&self, ip: &str) -> RateDecision {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let state = guard.entry(ip.to_string()).or_insert_with(|| IpState {
            window_start: now,
            count: 0,
            violations: Vec::new(),
            banned_until: None,
        });

        if let Some(until) = state.banned_until {
            if now < until {
                return RateDecision::Banned;
            }
            state.banned_until = None;
            state.violations.clear();
        }

        if now.duration_since(state.window_start) >= WINDOW {
            state.window_start = now;
            state.count = 0;
        }
        state.count += 1;

        if state.count > self.per_min {
            state.violations.retain(|v| now.duration_since(*v) < VIOLATION_WINDOW);
            state.violations.push(now);
            if state.violations.len() as u32 >= VIOLATION_THRESHOLD {
                state.banned_until = Some(now + BAN_DURATION);
                return RateDecision::Banned;
            }
            return RateDecision::RateLimited;
        }

        RateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_cap() {
        let limiter = IpRateLimiter::new(60);
        for _ in 0..60 {
            assert_eq!(limiter.check("1.2.3.4"), RateDecision::Allowed);
        }
    }

    #[test]
    fn rejects_requests_over_the_cap() {
        let limiter = IpRateLimiter::new(2);
        assert_eq!(limiter.check("1.2.3.4"), RateDecision::Allowed);
        assert_eq!(limiter.check("1.2.3.4"), RateDecision::Allowed);
        assert_eq!(limiter.check("1.2.3.4"), RateDecision::RateLimited);
    }

    #[test]
    fn bans_after_repeated_violations() {
        let limiter = IpRateLimiter::new(1);
        assert_eq!(limiter.check("5.6.7.8"), RateDecision::Allowed);
        for _ in 0..4 {
            assert_eq!(limiter.check("5.6.7.8"), RateDecision::RateLimited);
        }
        assert_eq!(limiter.check("5.6.7.8"), RateDecision::Banned);
        assert_eq!(limiter.check("5.6.7.8"), RateDecision::Banned);
    }

    #[test]
    fn separate_ips_are_tracked_independently() {
        let limiter = IpRateLimiter::new(1);
        assert_eq!(limiter.check("a"), RateDecision::Allowed);
        assert_eq!(limiter.check("b"), RateDecision::Allowed);
    }
}

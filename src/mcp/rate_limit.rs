//! Sliding-window rate limiter keyed on `(server_slug, project_id or "global")` (§4.4).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const MAX_CALLS_PER_WINDOW: usize = 60;

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn key(server_slug: &str, project_id: Option<&str>) -> String {
        format!("{server_slug}:{}", project_id.unwrap_or("global"))
    }

    /// Returns `true` if this call is allowed (and records it); `false` if
    /// the caller has exceeded 60 calls/minute for this key.
    pub fn check_and_record(&self, server_slug: &str, project_id: Option<&str>) -> bool {
        let key = Self::key(server_slug, project_id);
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let timestamps = windows.entry(key).or_default();
        timestamps.retain(|t| now.duration_since(*t) < WINDOW);
        if timestamps.len() >= MAX_CALLS_PER_WINDOW {
            return false;
        }
        timestamps.push(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_60_calls_then_rejects() {
        let limiter = RateLimiter::new();
        for _ in 0..60 {
            assert!(limiter.check_and_record("github", Some("proj-1")));
        }
        assert!(!limiter.check_and_record("github", Some("proj-1")));
    }

    #[test]
    fn keys_are_independent_per_server_and_project() {
        let limiter = RateLimiter::new();
        for _ in 0..60 {
            assert!(limiter.check_and_record("github", Some("proj-1")));
        }
        assert!(limiter.check_and_record("github", Some("proj-2")));
        assert!(limiter.check_and_record("jira", Some("proj-1")));
    }
}

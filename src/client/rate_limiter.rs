//! Adaptive per-route throttling for the rating API.
//!
//! Epistemic foundation:
//! - I^B: The service's real rate limit is unknowable → learn it from 429s
//!
//! - 429 responses put the route into exponential backoff
//! - `Retry-After` hints extend the backoff when longer
//! - Any success clears the backoff
//!
//! All workers share one limiter, so a backoff triggered by one worker
//! slows every request to the same route.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest backoff applied after repeated 429s.
const MAX_BACKOFF_SECS: f64 = 60.0;

/// Throttle state of one route.
#[derive(Debug, Default)]
pub struct RouteState {
    /// Consecutive 429 responses
    pub consecutive_429s: u32,
    /// Requests wait until this instant
    pub backoff_until: Option<Instant>,
}

impl RouteState {
    /// Time left before the route may be called again.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        self.backoff_until
            .filter(|&t| t > now)
            .map(|t| t - now)
            .unwrap_or(Duration::ZERO)
    }

    /// Record a 429 and compute the new backoff.
    pub fn record_429(&mut self, retry_after: Option<f64>) {
        self.consecutive_429s += 1;
        let exponential = 2.0_f64.powi(self.consecutive_429s as i32).min(MAX_BACKOFF_SECS);
        let backoff_secs = retry_after.map_or(exponential, |hint| hint.max(exponential));
        self.backoff_until = Some(Instant::now() + Duration::from_secs_f64(backoff_secs));
        warn!(
            consecutive_429s = self.consecutive_429s,
            backoff_secs, "Rate limited (429), backing off"
        );
    }

    pub fn record_success(&mut self) {
        if self.consecutive_429s > 0 {
            self.consecutive_429s = 0;
            self.backoff_until = None;
        }
    }
}

/// Shared limiter keyed by route name ("clubs", "players", "history").
#[derive(Debug, Default)]
pub struct RateLimiter {
    routes: DashMap<String, RouteState>,
    total_requests: AtomicU64,
    total_429s: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep until `route` is out of backoff. Returns the time waited.
    pub async fn wait_if_needed(&self, route: &str) -> Duration {
        // Guard must be released before sleeping
        let wait = self
            .routes
            .get(route)
            .map(|s| s.wait_time())
            .unwrap_or(Duration::ZERO);

        if wait > Duration::ZERO {
            debug!(route, wait_ms = wait.as_millis() as u64, "Waiting for rate limit");
            self.total_wait_ms
                .fetch_add(wait.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Record the outcome of one request.
    pub fn record(&self, route: &str, status: u16, retry_after: Option<f64>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let mut state = self.routes.entry(route.to_string()).or_default();
        if status == 429 {
            self.total_429s.fetch_add(1, Ordering::Relaxed);
            state.record_429(retry_after);
        } else if status < 400 {
            state.record_success();
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_429s = self.total_429s.load(Ordering::Relaxed);
        RateLimiterStats {
            total_requests,
            total_429s,
            total_wait_secs: self.total_wait_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            routes_tracked: self.routes.len(),
        }
    }
}

/// Limiter counters for the end-of-run report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub total_429s: u64,
    pub total_wait_secs: f64,
    pub routes_tracked: usize,
}

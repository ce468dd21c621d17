use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tracing::warn;

use crate::metrics;
use crate::state::AppState;

/// Rejection body, kept byte-for-byte compatible with the previous gateway.
pub const LIMIT_MESSAGE: &str = "Max requests per minute reached";

// Standard draft rate-limit headers. No legacy X-RateLimit-* variants.
pub const HEADER_LIMIT: &str = "ratelimit-limit";
pub const HEADER_REMAINING: &str = "ratelimit-remaining";
pub const HEADER_RESET: &str = "ratelimit-reset";

// Per-client fixed window: request count + when the window opened
pub struct ClientWindow {
    pub count: u32,
    pub window_start: Instant,
}

/// Window state as observed by a single increment.
#[derive(Debug, Clone, Copy)]
pub struct WindowUsage {
    /// Requests counted in the current window, this one included.
    pub count: u32,
    /// Time left until the window resets.
    pub reset_after: Duration,
}

/// Narrow seam for the counter store. Single-instance deployments use the
/// in-memory map below; a cluster-wide limiter swaps in a shared store
/// without touching the admission algorithm.
pub trait CounterStore: Send + Sync {
    /// Record one request for `key` at `now` and report the window state.
    fn increment(&self, key: &str, now: Instant) -> WindowUsage;

    /// Number of distinct clients currently tracked.
    fn tracked_clients(&self) -> usize;
}

/// In-memory counter store. The DashMap entry guard gives per-client mutual
/// exclusion without serializing unrelated clients. Entries are created
/// lazily and live for the process lifetime (accepted limitation).
pub struct InMemoryCounterStore {
    windows: DashMap<String, ClientWindow>,
    window_len: Duration,
}

impl InMemoryCounterStore {
    pub fn new(window_len: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window_len,
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, now: Instant) -> WindowUsage {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(ClientWindow {
                count: 0,
                window_start: now,
            });

        // window expired? reset it
        if now.duration_since(entry.window_start) >= self.window_len {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        let elapsed = now.duration_since(entry.window_start);
        WindowUsage {
            count: entry.count,
            reset_after: self.window_len.saturating_sub(elapsed),
        }
    }

    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Outcome of one admission check, carrying everything the HTTP layer
/// needs to emit the RateLimit headers.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Fixed-window admission controller.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_len: Duration) -> Self {
        Self::with_store(Arc::new(InMemoryCounterStore::new(window_len)), max_requests)
    }

    pub fn with_store(store: Arc<dyn CounterStore>, max_requests: u32) -> Self {
        Self {
            store,
            max_requests,
        }
    }

    /// Count one request for `key` and decide whether it may proceed.
    /// Rejected requests still consume an admission slot in the window.
    pub fn admit(&self, key: &str, now: Instant) -> Decision {
        let usage = self.store.increment(key, now);
        Decision {
            allowed: usage.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(usage.count),
            reset_after: usage.reset_after,
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.store.tracked_clients()
    }
}

/// Admission middleware in front of proxy dispatch. Over-limit requests
/// terminate here with 429; everything else proceeds. Both outcomes carry
/// the RateLimit headers.
pub async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client_key = addr.ip().to_string();
    let decision = state.limiter.admit(&client_key, Instant::now());
    metrics::TRACKED_CLIENTS.set(state.limiter.tracked_clients() as f64);

    if !decision.allowed {
        metrics::RATE_LIMITED_TOTAL.inc();
        warn!(client = %client_key, path = %request.uri().path(), "rate limit exceeded");

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": LIMIT_MESSAGE })),
        )
            .into_response();
        set_rate_limit_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    set_rate_limit_headers(&mut response, &decision);
    response
}

fn set_rate_limit_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    headers.insert(HEADER_LIMIT, numeric_header(decision.limit as u64));
    headers.insert(HEADER_REMAINING, numeric_header(decision.remaining as u64));
    headers.insert(HEADER_RESET, numeric_header(decision.reset_after.as_secs()));
}

fn numeric_header(value: u64) -> HeaderValue {
    // decimal digits are always a valid header value
    HeaderValue::from_str(&value.to_string()).unwrap_or(HeaderValue::from_static("0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(60_000);

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new(3, WINDOW);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.admit("1.2.3.4", now).allowed);
        }
    }

    #[test]
    fn rejects_beyond_the_limit() {
        let limiter = RateLimiter::new(3, WINDOW);
        let now = Instant::now();

        for _ in 0..3 {
            limiter.admit("1.2.3.4", now);
        }
        let decision = limiter.admit("1.2.3.4", now);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = RateLimiter::new(3, WINDOW);
        let start = Instant::now();

        for _ in 0..4 {
            limiter.admit("1.2.3.4", start);
        }

        // next request after the window elapses opens a fresh window
        let later = start + WINDOW;
        let decision = limiter.admit("1.2.3.4", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(3, WINDOW);
        let now = Instant::now();

        for _ in 0..4 {
            limiter.admit("1.2.3.4", now);
        }
        assert!(limiter.admit("5.6.7.8", now).allowed);
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = RateLimiter::new(3, WINDOW);
        let now = Instant::now();

        assert_eq!(limiter.admit("c", now).remaining, 2);
        assert_eq!(limiter.admit("c", now).remaining, 1);
        assert_eq!(limiter.admit("c", now).remaining, 0);
        // rejected requests never report negative quota
        assert_eq!(limiter.admit("c", now).remaining, 0);
    }

    #[test]
    fn reset_reflects_time_left_in_window() {
        let limiter = RateLimiter::new(3, WINDOW);
        let start = Instant::now();

        let decision = limiter.admit("c", start);
        assert_eq!(decision.reset_after, WINDOW);

        let decision = limiter.admit("c", start + Duration::from_secs(20));
        assert_eq!(decision.reset_after, Duration::from_secs(40));
    }

    #[test]
    fn tracks_distinct_clients() {
        let limiter = RateLimiter::new(3, WINDOW);
        let now = Instant::now();

        limiter.admit("a", now);
        limiter.admit("a", now);
        limiter.admit("b", now);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn custom_store_drives_decisions() {
        struct FixedStore(u32);
        impl CounterStore for FixedStore {
            fn increment(&self, _key: &str, _now: Instant) -> WindowUsage {
                WindowUsage {
                    count: self.0,
                    reset_after: Duration::from_secs(7),
                }
            }
            fn tracked_clients(&self) -> usize {
                1
            }
        }

        let limiter = RateLimiter::with_store(Arc::new(FixedStore(5)), 3);
        let decision = limiter.admit("anyone", Instant::now());
        assert!(!decision.allowed);
        assert_eq!(decision.reset_after, Duration::from_secs(7));
    }
}

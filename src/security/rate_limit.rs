//! Per-IP rate limiting middleware for the public endpoints.

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::schema::GatewayConfig;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared state for the per-IP limiter.
///
/// Limits are read from the live config on every check, so hot reloads
/// apply without restarting.
pub struct RateLimiterState {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: Arc<ArcSwap<GatewayConfig>>,
}

impl RateLimiterState {
    pub fn new(config: Arc<ArcSwap<GatewayConfig>>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn check(&self, key: String) -> bool {
        let config = self.config.load();
        let limits = &config.rate_limit;
        if !limits.enabled {
            return true;
        }
        let rps = limits.requests_per_second as f64;
        let burst = limits.burst_size.max(1) as f64;

        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(burst));

        bucket.try_acquire(burst, rps)
    }
}

/// Middleware shedding clients that exceed the configured rate.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RateLimiterState>>,
    request: Request,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();

    if state.check(key.clone()) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited("rps_limit");
        let mut response = Response::new(Body::from("Rate limit exceeded"));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response
    }
}

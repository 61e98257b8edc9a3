//! Security subsystem.
//!
//! # Design Decisions
//! - Public endpoints are rate limited per client IP (token bucket)
//! - Admin endpoints require a bearer key (see `admin::auth`)
//! - Body size limits live in the tower-http layer stack

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiterState};

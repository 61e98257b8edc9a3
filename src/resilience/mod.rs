//! Resilience subsystem.
//!
//! # Design Decisions
//! - Chain reads retry with jittered exponential backoff
//! - Jitter prevents thundering herd against a recovering RPC node
//! - Writes (anchor/mint) are NOT retried blindly; a duplicate
//!   broadcast is worse than a surfaced error

pub mod retry;

pub use retry::{calculate_backoff, with_retries};

//! QR session state subsystem.
//!
//! # Data Flow
//! ```text
//! token issuance
//!     → store.rs record (nonce → session, TTL = token expiry)
//! token verification
//!     → store.rs consume (atomic single-use decision)
//! background sweeper
//!     → store.rs purge_expired (bounded memory)
//! ```
//!
//! # Design Decisions
//! - One atomic map removal decides which concurrent presentation wins
//! - Consumed nonces leave a tombstone until expiry so replays are
//!   reported distinctly from unknown nonces

pub mod store;

pub use store::{ConsumeOutcome, QrSession, SessionStore};

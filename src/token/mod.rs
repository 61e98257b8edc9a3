//! QR token subsystem.
//!
//! # Data Flow
//! ```text
//! POST /settlement/qr
//!     → issuer.rs (fresh nonce, short expiry, claims signed with the
//!       issuer key, session recorded with TTL)
//!     → types.rs wire encoding (base64 of the signed claims JSON)
//!
//! GET /verify?qr= / POST /settlement/verify-qr
//!     → verifier.rs ordered gates, each fail-closed:
//!       signature → expiry → nonce → audience/scope → on-chain
//!       re-derivation (anchored root, inclusion proofs, ownership)
//! ```
//!
//! # Design Decisions
//! - Token claims are lookup keys only; a pass is never produced from
//!   token contents alone
//! - The verifier's trust anchor is the issuer ADDRESS, recovered from
//!   the signature, not any key material in the token

pub mod issuer;
pub mod types;
pub mod verifier;

pub use issuer::{IssueError, IssuedToken, TokenIssuer};
pub use types::{QrToken, SignedToken, TokenError, TokenRefs, TOKEN_TYPE, VERIFY_SCOPE};
pub use verifier::{TokenVerifier, VerificationReport, VerifyError};

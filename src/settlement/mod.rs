//! Settlement batches and Merkle anchoring subsystem.
//!
//! # Data Flow
//! ```text
//! consumption recording
//!     → batch.rs (append leaf under its month)
//! settlement build
//!     → merkle.rs (keccak256 tree over the month's leaves)
//! settlement anchor
//!     → chain relay submits the root on-chain, batch.rs records the tx
//! verification
//!     → batch.rs proofs + merkle.rs verify against the ANCHORED root
//! ```
//!
//! # Design Decisions
//! - Pair hashing is commutative (sorted operands) so proofs carry no
//!   direction flags
//! - Anchoring seals a month; later consumption records are rejected
//! - The on-chain root is authoritative; the local tree only supplies
//!   leaf indices and sibling paths

pub mod batch;
pub mod merkle;

pub use batch::{AnchorRecord, ConsumptionLeaf, SettlementError, SettlementStore};
pub use merkle::{verify_proof, MerkleTree};

/// Period key, e.g. 202509 for September 2025.
pub type MonthId = u32;

//! Chain access subsystem.
//!
//! # Data Flow
//! ```text
//! Environment variables (private keys, RPC URL from config)
//!     → wallet.rs (key loading, signing)
//!     → client.rs (RPC connection with timeouts and failover)
//!     → relay.rs (build, sign, broadcast, confirm transactions)
//!     → registry.rs (contract bindings + Ledger read trait)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - Verification reads fail closed when the chain is unreachable

pub mod client;
pub mod registry;
pub mod relay;
pub mod types;
pub mod wallet;

pub use client::ChainClient;
pub use registry::{DisabledLedger, Ledger, OnchainLedger};
pub use relay::ChainRelay;
pub use types::{ChainError, ChainId, ChainResult, ConfirmationStatus};
pub use wallet::Wallet;

//! Entity records subsystem.
//!
//! # Data Flow
//! ```text
//! Admin registration endpoints
//!     → registry.rs (producer / project / consumer records)
//!     → referenced by minting, consumption recording, token issuance,
//!       and ownership checks during verification
//! ```
//!
//! # Design Decisions
//! - Entities are keyed by their external id string ("producer:5")
//! - Every entity carries the chain address used for on-chain lookups
//! - Projects must reference an already-registered producer

pub mod registry;

pub use registry::{Entity, EntityKind, EntityRegistry, RegistryError};

//! Admin plane: bearer-key authenticated operational endpoints.
//!
//! # Design Decisions
//! - Disabled entirely unless `admin.enabled` is set (404, not 401,
//!   so the surface stays invisible)
//! - Entity registration lives here: it changes who can mint and verify

pub mod auth;
pub mod handlers;

//! Green Energy Certification verification gateway library.

pub mod admin;
pub mod chain;
pub mod config;
pub mod entities;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod session;
pub mod settlement;
pub mod token;

pub use config::schema::GatewayConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;

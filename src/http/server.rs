//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, rate limiting)
//! - Bind server to listener
//! - Apply hot config reloads
//! - Graceful shutdown

use alloy::primitives::Address;
use arc_swap::ArcSwap;
use axum::http::StatusCode;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::chain::client::ChainClient;
use crate::chain::relay::ChainRelay;
use crate::chain::types::{ChainError, ChainResult};
use crate::config::schema::GatewayConfig;
use crate::entities::EntityRegistry;
use crate::http::handlers;
use crate::http::request;
use crate::http::response::ApiError;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiterState};
use crate::session::store::SessionStore;
use crate::settlement::SettlementStore;
use crate::token::issuer::TokenIssuer;
use crate::token::verifier::TokenVerifier;

/// Parsed registry addresses, present when chain integration is enabled.
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub unit_registry: Address,
    pub settlement_registry: Address,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub entities: EntityRegistry,
    pub sessions: SessionStore,
    pub settlements: SettlementStore,
    pub issuer: Arc<TokenIssuer>,
    pub verifier: Arc<TokenVerifier>,
    /// Read client; `None` when chain integration is disabled.
    pub chain: Option<Arc<ChainClient>>,
    /// Signing relay; `None` when disabled or no submitter key is set.
    pub relay: Option<Arc<ChainRelay>>,
    pub contracts: Option<ContractAddresses>,
    pub limiter: Arc<RateLimiterState>,
}

impl AppState {
    /// The relay, or a fail-closed error for write operations.
    pub fn relay(&self) -> Result<&ChainRelay, ApiError> {
        self.relay
            .as_deref()
            .ok_or_else(|| ChainError::NotAvailable("chain relay not configured".into()).into())
    }

    /// Registry addresses, or a fail-closed error.
    pub fn contracts(&self) -> Result<ContractAddresses, ApiError> {
        self.contracts
            .ok_or_else(|| ChainError::NotAvailable("registry addresses not configured".into()).into())
    }

    pub fn confirmation_timeout_secs(&self) -> u64 {
        self.config.load().timeouts.confirmation_secs
    }
}

/// Parse the configured contract addresses.
pub fn parse_contracts(config: &GatewayConfig) -> ChainResult<ContractAddresses> {
    let unit_registry = config
        .contracts
        .unit_registry
        .parse()
        .map_err(|_| ChainError::Contract("invalid unit_registry address".into()))?;
    let settlement_registry = config
        .contracts
        .settlement_registry
        .parse()
        .map_err(|_| ChainError::Contract("invalid settlement_registry address".into()))?;
    Ok(ContractAddresses {
        unit_registry,
        settlement_registry,
    })
}

/// HTTP server for the verification gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server over the assembled state.
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let config = state.config.load();

        // Public surface: issuance, verification, health. Rate limited.
        let public = Router::new()
            .route("/settlement/qr", post(handlers::issue_qr))
            .route("/settlement/verify-qr", post(handlers::verify_qr))
            .route("/verify", get(handlers::verify_qr_link))
            .route("/health", get(handlers::health))
            .layer(middleware::from_fn_with_state(
                state.limiter.clone(),
                rate_limit_middleware,
            ));

        // Operator surface: settlement pipeline.
        let operator = Router::new()
            .route("/project/mint", post(handlers::mint_units))
            .route("/project/consume", post(handlers::record_consumption))
            .route("/settlement/build", post(handlers::build_settlement))
            .route("/settlement/anchor", post(handlers::anchor_settlement));

        // Admin surface: bearer-key gated.
        let admin_routes = Router::new()
            .route("/admin/status", get(admin::handlers::get_status))
            .route("/admin/sessions", get(admin::handlers::get_sessions))
            .route("/admin/anchors", get(admin::handlers::get_anchors))
            .route("/admin/entities/producer", post(admin::handlers::add_producer))
            .route("/admin/entities/project", post(admin::handlers::add_project))
            .route("/admin/entities/consumer", post(admin::handlers::add_consumer))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                admin::auth::admin_auth_middleware,
            ));

        Router::new()
            .merge(public)
            .merge(operator)
            .merge(admin_routes)
            .fallback(|| async { StatusCode::NOT_FOUND })
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(request::set_layer())
                    .layer(request::propagate_layer())
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Config updates from the watcher are applied via atomic swap;
    /// chain endpoints and contract addresses stay fixed until restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shared_config = self.state.config.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                let old = shared_config.load();
                if new_config.chain.rpc_url != old.chain.rpc_url
                    || new_config.contracts.unit_registry != old.contracts.unit_registry
                    || new_config.contracts.settlement_registry
                        != old.contracts.settlement_registry
                {
                    tracing::warn!(
                        "Chain/contract settings changed on disk; restart required to apply them"
                    );
                }
                shared_config.store(Arc::new(new_config));
                tracing::info!("Configuration reloaded");
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

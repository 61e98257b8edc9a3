//! Green Energy Certification verification gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────────┐
//!                    │                  GEC RELAY                         │
//!                    │                                                    │
//!   Web app /        │  ┌─────────┐   ┌──────────┐   ┌────────────────┐  │
//!   scanner ─────────┼─▶│  http   │──▶│  token   │──▶│    session     │  │
//!                    │  │ gateway │   │ issue /  │   │  nonce store   │  │
//!                    │  └─────────┘   │  verify  │   └────────────────┘  │
//!                    │                └────┬─────┘                       │
//!                    │                     │ re-derive on-chain          │
//!                    │                     ▼                             │
//!                    │  ┌────────────┐  ┌───────────────┐                │
//!                    │  │ settlement │  │     chain     │◀───────────────┼──── ADI RPC
//!                    │  │ merkle +   │  │ client/relay/ │                │    (GEC1155,
//!                    │  │  batches   │  │  registries   │                │  SettlementRegistry)
//!                    │  └────────────┘  └───────────────┘                │
//!                    │                                                    │
//!                    │  ┌──────────────────────────────────────────────┐ │
//!                    │  │           Cross-Cutting Concerns             │ │
//!                    │  │  config · observability · security ·         │ │
//!                    │  │  resilience · lifecycle                      │ │
//!                    │  └──────────────────────────────────────────────┘ │
//!                    └────────────────────────────────────────────────────┘
//! ```

use arc_swap::ArcSwap;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gec_relay::chain::client::ChainClient;
use gec_relay::chain::registry::{DisabledLedger, Ledger, OnchainLedger};
use gec_relay::chain::relay::ChainRelay;
use gec_relay::chain::wallet::{Wallet, CHAIN_KEY_ENV_VAR, TOKEN_KEY_ENV_VAR};
use gec_relay::config::loader::load_config;
use gec_relay::config::watcher::ConfigWatcher;
use gec_relay::entities::EntityRegistry;
use gec_relay::http::server::{parse_contracts, AppState, HttpServer};
use gec_relay::lifecycle::{signals, Shutdown};
use gec_relay::observability::{logging, metrics};
use gec_relay::security::rate_limit::RateLimiterState;
use gec_relay::session::store::{run_sweeper, SessionStore};
use gec_relay::settlement::SettlementStore;
use gec_relay::token::issuer::TokenIssuer;
use gec_relay::token::verifier::TokenVerifier;
use gec_relay::GatewayConfig;

#[derive(Parser, Debug)]
#[command(name = "gec-relay", version, about = "QR on-chain verification gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gec-relay starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The issuer key is mandatory: without it no token can be minted and
    // no verification trust anchor exists.
    let token_wallet = Wallet::from_env_var(TOKEN_KEY_ENV_VAR, config.chain.chain_id)?;
    let issuer_address = token_wallet.address();

    let entities = EntityRegistry::new();
    let sessions = SessionStore::new();
    let settlements = SettlementStore::new();

    let (chain, relay, contracts, ledger): (_, _, _, Arc<dyn Ledger>) = if config.chain.enabled {
        let client = ChainClient::new(config.chain.clone()).await?;
        let contracts = parse_contracts(&config)?;
        let ledger = Arc::new(OnchainLedger::new(
            client.clone(),
            contracts.unit_registry,
            contracts.settlement_registry,
            config.retries.clone(),
        ));
        // The submitter key is optional: a read-only deployment can
        // verify but not mint or anchor.
        let relay = match Wallet::from_env_var(CHAIN_KEY_ENV_VAR, config.chain.chain_id) {
            Ok(wallet) => Some(Arc::new(ChainRelay::new(client.clone(), wallet)?)),
            Err(e) => {
                tracing::warn!(error = %e, "No submitter key; mint/anchor disabled");
                None
            }
        };
        (Some(Arc::new(client)), relay, Some(contracts), ledger)
    } else {
        tracing::warn!("Chain integration disabled; verification will fail closed");
        (None, None, None, Arc::new(DisabledLedger))
    };

    let shared_config = Arc::new(ArcSwap::from_pointee(config.clone()));

    let issuer = Arc::new(TokenIssuer::new(
        token_wallet,
        shared_config.clone(),
        sessions.clone(),
        entities.clone(),
        settlements.clone(),
    ));
    let verifier = Arc::new(TokenVerifier::new(
        issuer_address,
        shared_config.clone(),
        sessions.clone(),
        entities.clone(),
        settlements.clone(),
        ledger,
    ));
    let limiter = Arc::new(RateLimiterState::new(shared_config.clone()));

    let state = AppState {
        config: shared_config,
        entities,
        sessions: sessions.clone(),
        settlements,
        issuer,
        verifier,
        chain,
        relay,
        contracts,
        limiter,
    };

    // Hot reload when running from a config file.
    let (config_updates_tx, config_updates) = mpsc::unbounded_channel();
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut rx) = ConfigWatcher::new(path);
            let tx = config_updates_tx.clone();
            tokio::spawn(async move {
                while let Some(update) = rx.recv().await {
                    let _ = tx.send(update);
                }
            });
            Some(watcher.run()?)
        }
        None => None,
    };

    let shutdown = Arc::new(Shutdown::new());

    tokio::spawn(run_sweeper(
        sessions,
        Duration::from_secs(config.token.sweep_interval_secs.max(1)),
        shutdown.subscribe(),
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            signals::listen(&shutdown).await;
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        issuer = %issuer_address,
        chain_enabled = config.chain.enabled,
        "Listening for connections"
    );

    let server = HttpServer::new(state);
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

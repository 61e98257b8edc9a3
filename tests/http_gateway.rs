//! Socket-level tests of the HTTP gateway with chain integration
//! disabled: issuance works locally, verification fails closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc};

use gec_relay::chain::registry::DisabledLedger;
use gec_relay::chain::wallet::Wallet;
use gec_relay::entities::EntityRegistry;
use gec_relay::http::server::{AppState, HttpServer};
use gec_relay::security::rate_limit::RateLimiterState;
use gec_relay::session::store::SessionStore;
use gec_relay::settlement::SettlementStore;
use gec_relay::token::issuer::TokenIssuer;
use gec_relay::token::verifier::TokenVerifier;
use gec_relay::GatewayConfig;

mod common;
use common::{CONS_ENTITY, ISSUER_KEY, MONTH, PROD_ENTITY, PROJ_ENTITY};

const ADMIN_KEY: &str = "test-admin-key";

/// Boot a gateway on an ephemeral port and return its base URL plus the
/// shutdown sender keeping it alive.
async fn start_gateway(mut config: GatewayConfig) -> (String, broadcast::Sender<()>) {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.observability.metrics_enabled = false;

    let shared_config = Arc::new(ArcSwap::from_pointee(config));
    let entities = EntityRegistry::new();
    let sessions = SessionStore::new();
    let settlements = SettlementStore::new();
    let wallet = Wallet::from_private_key(ISSUER_KEY, 36900).unwrap();
    let issuer_address = wallet.address();

    let issuer = Arc::new(TokenIssuer::new(
        wallet,
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
        Arc::new(DisabledLedger),
    ));
    let limiter = Arc::new(RateLimiterState::new(shared_config.clone()));

    let state = AppState {
        config: shared_config,
        entities,
        sessions,
        settlements,
        issuer,
        verifier,
        chain: None,
        relay: None,
        contracts: None,
        limiter,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (_config_tx, config_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(state);
    tokio::spawn(async move {
        let _ = server.run(listener, config_rx, shutdown_rx).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    (format!("http://{addr}"), shutdown_tx)
}

fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.rate_limit.enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

async fn register_all(client: &reqwest::Client, base: &str) {
    for (path, body) in [
        (
            "/admin/entities/producer",
            serde_json::json!({"id": PROD_ENTITY, "ethAddress": "0x00000000000000000000000000000000000000a1"}),
        ),
        (
            "/admin/entities/project",
            serde_json::json!({"id": PROJ_ENTITY, "producerId": PROD_ENTITY, "ethAddress": "0x00000000000000000000000000000000000000a2"}),
        ),
        (
            "/admin/entities/consumer",
            serde_json::json!({"id": CONS_ENTITY, "ethAddress": "0x00000000000000000000000000000000000000c1"}),
        ),
    ] {
        let resp = client
            .post(format!("{base}{path}"))
            .bearer_auth(ADMIN_KEY)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "registration at {path} failed");
    }
}

#[tokio::test]
async fn health_reports_chain_disabled() {
    let (base, _shutdown) = start_gateway(test_config()).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chain"], "disabled");
}

#[tokio::test]
async fn admin_requires_bearer_key() {
    let (base, _shutdown) = start_gateway(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{base}/admin/status"))
        .bearer_auth("wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{base}/admin/status"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn admin_disabled_is_invisible() {
    let mut config = test_config();
    config.admin.enabled = false;
    let (base, _shutdown) = start_gateway(config).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/admin/status"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn issuance_works_but_verification_fails_closed() {
    let (base, _shutdown) = start_gateway(test_config()).await;
    let client = reqwest::Client::new();
    register_all(&client, &base).await;

    // Record consumption so the month is known to the issuer.
    let resp = client
        .post(format!("{base}/project/consume"))
        .json(&serde_json::json!({
            "projectId": PROJ_ENTITY,
            "consumerId": CONS_ENTITY,
            "monthId": MONTH,
            "units": 10,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{base}/settlement/build"))
        .json(&serde_json::json!({"monthId": MONTH}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Issuance is local signing; it does not need the chain.
    let resp = client
        .post(format!("{base}/settlement/qr"))
        .json(&serde_json::json!({"consumerId": CONS_ENTITY, "monthId": MONTH}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let issued: serde_json::Value = resp.json().await.unwrap();
    let qr = issued["qr"].as_str().unwrap().to_string();
    assert!(issued["redirect"].as_str().unwrap().contains("?qr="));

    // Verification must consult the chain; with it disabled there is no
    // verdict, only an unavailability error.
    let resp = client
        .post(format!("{base}/settlement/verify-qr"))
        .json(&serde_json::json!({"qr": qr}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    // Mint likewise refuses without a relay.
    let resp = client
        .post(format!("{base}/project/mint"))
        .json(&serde_json::json!({"projectId": PROJ_ENTITY, "monthId": MONTH, "units": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn verify_link_rejects_garbage_as_bad_request() {
    let (base, _shutdown) = start_gateway(test_config()).await;
    let resp = reqwest::get(format!("{base}/verify?qr=%40%40garbage"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn duplicate_entity_conflicts() {
    let (base, _shutdown) = start_gateway(test_config()).await;
    let client = reqwest::Client::new();
    register_all(&client, &base).await;

    let resp = client
        .post(format!("{base}/admin/entities/producer"))
        .bearer_auth(ADMIN_KEY)
        .json(&serde_json::json!({"id": PROD_ENTITY, "ethAddress": "0x00000000000000000000000000000000000000a1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn public_routes_are_rate_limited() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 2;
    let (base, _shutdown) = start_gateway(config).await;

    let client = reqwest::Client::new();
    let mut shed = 0;
    for _ in 0..5 {
        let resp = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap();
        if resp.status() == 429 {
            shed += 1;
        }
    }
    assert!(shed >= 1, "limiter never shed within the burst window");
}

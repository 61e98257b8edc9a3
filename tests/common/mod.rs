//! Shared test fixtures: an in-memory ledger and a fully wired stack.
#![allow(dead_code)] // not every test binary uses every fixture

use alloy::primitives::{Address, B256, U256};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;

use gec_relay::chain::registry::Ledger;
use gec_relay::chain::types::{ChainError, ChainResult};
use gec_relay::chain::wallet::Wallet;
use gec_relay::entities::EntityRegistry;
use gec_relay::session::store::SessionStore;
use gec_relay::settlement::{MonthId, SettlementStore};
use gec_relay::token::issuer::TokenIssuer;
use gec_relay::token::verifier::TokenVerifier;
use gec_relay::GatewayConfig;

/// Anvil's first well-known account; the token issuer key in tests.
pub const ISSUER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// A second well-known account, used as a wrong-issuer signer.
pub const OTHER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const PROD_ENTITY: &str = "producer:5";
pub const PROJ_ENTITY: &str = "project:sol-101";
pub const CONS_ENTITY: &str = "consumer:acme-1";
pub const MONTH: MonthId = 202509;

pub fn consumer_address() -> Address {
    "0x00000000000000000000000000000000000000c1".parse().unwrap()
}

/// In-memory stand-in for the two registry contracts.
#[derive(Default)]
pub struct MockLedger {
    roots: DashMap<MonthId, B256>,
    balances: DashMap<(Address, U256), U256>,
    /// When set, every read fails as if the RPC were down.
    pub unreachable: std::sync::atomic::AtomicBool,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_root(&self, month_id: MonthId, root: B256) {
        self.roots.insert(month_id, root);
    }

    pub fn set_balance(&self, owner: Address, id: U256, balance: U256) {
        self.balances.insert((owner, id), balance);
    }

    pub fn set_unreachable(&self, down: bool) {
        self.unreachable
            .store(down, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_reachable(&self) -> ChainResult<()> {
        if self.unreachable.load(std::sync::atomic::Ordering::SeqCst) {
            Err(ChainError::Rpc("mock RPC down".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Ledger for MockLedger {
    fn anchored_root(&self, month_id: MonthId) -> BoxFuture<'_, ChainResult<Option<B256>>> {
        async move {
            self.check_reachable()?;
            Ok(self.roots.get(&month_id).map(|r| *r.value()))
        }
        .boxed()
    }

    fn unit_balance(&self, owner: Address, id: U256) -> BoxFuture<'_, ChainResult<U256>> {
        async move {
            self.check_reachable()?;
            Ok(self
                .balances
                .get(&(owner, id))
                .map(|b| *b.value())
                .unwrap_or(U256::ZERO))
        }
        .boxed()
    }
}

/// A wired issuer/verifier pair over shared in-memory stores.
pub struct TestStack {
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub entities: EntityRegistry,
    pub sessions: SessionStore,
    pub settlements: SettlementStore,
    pub ledger: Arc<MockLedger>,
    pub issuer: TokenIssuer,
    pub verifier: TokenVerifier,
    pub issuer_wallet: Wallet,
}

impl TestStack {
    pub fn new() -> Self {
        let config = Arc::new(ArcSwap::from_pointee(GatewayConfig::default()));
        let entities = EntityRegistry::new();
        let sessions = SessionStore::new();
        let settlements = SettlementStore::new();
        let ledger = MockLedger::new();

        let issuer_wallet = Wallet::from_private_key(ISSUER_KEY, 36900).unwrap();
        let issuer = TokenIssuer::new(
            issuer_wallet.clone(),
            config.clone(),
            sessions.clone(),
            entities.clone(),
            settlements.clone(),
        );
        let verifier = TokenVerifier::new(
            issuer_wallet.address(),
            config.clone(),
            sessions.clone(),
            entities.clone(),
            settlements.clone(),
            ledger.clone(),
        );

        Self {
            config,
            entities,
            sessions,
            settlements,
            ledger,
            issuer,
            verifier,
            issuer_wallet,
        }
    }

    /// Register the canonical E2E entities.
    pub fn register_entities(&self) {
        self.entities
            .add_producer(PROD_ENTITY, Address::repeat_byte(0xa1))
            .unwrap();
        self.entities
            .add_project(PROJ_ENTITY, PROD_ENTITY, Address::repeat_byte(0xa2))
            .unwrap();
        self.entities
            .add_consumer(CONS_ENTITY, consumer_address())
            .unwrap();
    }

    /// Record consumption, build the tree, and "anchor" it by exposing
    /// the built root through the mock ledger and recording the tx.
    pub fn settle_and_anchor(&self, leaves: &[u64]) -> B256 {
        for units in leaves {
            self.settlements
                .record_consumption(CONS_ENTITY, MONTH, *units)
                .unwrap();
        }
        let (root, _) = self.settlements.build(MONTH).unwrap();
        self.ledger.set_root(MONTH, root);
        self.settlements
            .record_anchor(MONTH, root, "0xanchor-tx".to_string())
            .unwrap();
        self.ledger
            .set_balance(consumer_address(), U256::from(MONTH), U256::from(1u64));
        root
    }
}

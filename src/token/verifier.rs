//! Token verification: ordered hard gates, each fail-closed.
//!
//! Gate order is part of the contract: signature, expiry, nonce,
//! audience/scope, then on-chain re-derivation. A token that fails an
//! early gate never consumes chain reads, and a replay never reaches the
//! chain at all.

use alloy::primitives::{Address, U256};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::registry::Ledger;
use crate::chain::types::ChainError;
use crate::config::schema::GatewayConfig;
use crate::entities::{EntityKind, EntityRegistry};
use crate::observability::metrics;
use crate::session::store::{now_unix, ConsumeOutcome, SessionStore};
use crate::settlement::merkle::verify_proof;
use crate::settlement::{MonthId, SettlementStore};
use crate::token::types::{SignedToken, TokenError, VERIFY_SCOPE};

/// Why a presented token was rejected.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The wire form or signature bytes are malformed.
    #[error(transparent)]
    Malformed(#[from] TokenError),

    /// The signature does not recover to the issuer address.
    #[error("token signature is not from the issuer")]
    BadSignature,

    /// The token's expiry has passed.
    #[error("token expired")]
    Expired,

    /// The nonce was never issued (or was swept after expiry).
    #[error("nonce unknown")]
    NonceUnknown,

    /// The nonce was already consumed.
    #[error("nonce already used")]
    NonceUsed,

    /// The token was minted for a different audience.
    #[error("audience mismatch")]
    Audience,

    /// The token does not grant the verification capability.
    #[error("missing scope {VERIFY_SCOPE}")]
    Scope,

    /// The token's refs disagree with the recorded session.
    #[error("token refs do not match the issued session")]
    RefsMismatch,

    /// The consumer reference is not a registered consumer.
    #[error("unknown consumer '{0}'")]
    UnknownConsumer(String),

    /// No root is anchored on-chain for the month.
    #[error("month {0} has no anchored settlement root")]
    NotAnchored(MonthId),

    /// The local batch does not match the anchored root.
    #[error("local settlement batch does not match the anchored root")]
    RootMismatch,

    /// No consumption is recorded for the consumer in the month.
    #[error("no consumption recorded for '{consumer}' in month {month}")]
    NoConsumption { consumer: String, month: MonthId },

    /// An inclusion proof failed against the anchored root.
    #[error("inclusion proof failed against the anchored root")]
    ProofInvalid,

    /// The consumer holds no units of the month's token.
    #[error("no unit ownership on the ledger for the month")]
    OwnershipMissing,

    /// The chain could not be consulted; no verdict either way.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl VerifyError {
    /// Stable reason label for metrics and API responses.
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::Malformed(_) => "malformed",
            VerifyError::BadSignature => "bad-signature",
            VerifyError::Expired => "expired",
            VerifyError::NonceUnknown => "nonce-unknown",
            VerifyError::NonceUsed => "nonce-used",
            VerifyError::Audience => "audience",
            VerifyError::Scope => "scope",
            VerifyError::RefsMismatch => "refs-mismatch",
            VerifyError::UnknownConsumer(_) => "unknown-consumer",
            VerifyError::NotAnchored(_) => "not-anchored",
            VerifyError::RootMismatch => "root-mismatch",
            VerifyError::NoConsumption { .. } => "no-consumption",
            VerifyError::ProofInvalid => "proof-invalid",
            VerifyError::OwnershipMissing => "ownership-missing",
            VerifyError::Chain(_) => "chain-unavailable",
        }
    }

    /// Whether this is a protocol-level rejection (a red certificate)
    /// rather than an infrastructure failure with no verdict.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, VerifyError::Chain(_))
    }
}

/// Result metadata returned to the scanner on a pass.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub verified: bool,
    /// Consumer entity id.
    pub entity: String,
    /// Total units proven for the consumer in the month.
    pub units: u64,
    #[serde(rename = "monthId")]
    pub month_id: MonthId,
    /// Anchor transaction reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    /// The anchored root the proofs were checked against.
    pub root: String,
}

/// Validates presented tokens against local state and the on-chain
/// ledger.
pub struct TokenVerifier {
    issuer_address: Address,
    config: Arc<ArcSwap<GatewayConfig>>,
    sessions: SessionStore,
    entities: EntityRegistry,
    settlements: SettlementStore,
    ledger: Arc<dyn Ledger>,
}

impl TokenVerifier {
    pub fn new(
        issuer_address: Address,
        config: Arc<ArcSwap<GatewayConfig>>,
        sessions: SessionStore,
        entities: EntityRegistry,
        settlements: SettlementStore,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            issuer_address,
            config,
            sessions,
            entities,
            settlements,
            ledger,
        }
    }

    /// Run every gate against the encoded token.
    pub async fn verify(&self, encoded: &str) -> Result<VerificationReport, VerifyError> {
        let result = self.run_gates(encoded).await;
        match &result {
            Ok(_) => metrics::record_verification("pass"),
            Err(e) => {
                metrics::record_verification(e.reason());
                tracing::info!(reason = e.reason(), "Token verification rejected");
            }
        }
        result
    }

    async fn run_gates(&self, encoded: &str) -> Result<VerificationReport, VerifyError> {
        let token = SignedToken::decode(encoded)?;
        let claims = &token.claims;

        // Gate 1: signature. Recover the signer and require the issuer
        // address; nothing inside the token names the trusted key.
        let payload = claims.signing_bytes()?;
        let signature = token.signature()?;
        let recovered = signature
            .recover_address_from_msg(payload.as_slice())
            .map_err(|_| VerifyError::BadSignature)?;
        if recovered != self.issuer_address {
            return Err(VerifyError::BadSignature);
        }

        // Gate 2: expiry.
        if claims.is_expired(now_unix()) {
            return Err(VerifyError::Expired);
        }

        // Gate 3: nonce, consumed atomically.
        let session = match self.sessions.consume(&claims.nonce) {
            ConsumeOutcome::Consumed(session) => session,
            ConsumeOutcome::AlreadyUsed => return Err(VerifyError::NonceUsed),
            ConsumeOutcome::Expired => return Err(VerifyError::Expired),
            ConsumeOutcome::Unknown => return Err(VerifyError::NonceUnknown),
        };
        // The signed refs must match what was issued under this nonce.
        if session.consumer_id != claims.refs.consumer_id
            || session.month_id != claims.refs.month_id
        {
            return Err(VerifyError::RefsMismatch);
        }

        // Gate 4: audience and scope.
        let config = self.config.load();
        if claims.aud != config.token.audience {
            return Err(VerifyError::Audience);
        }
        if !claims.has_scope(VERIFY_SCOPE) {
            return Err(VerifyError::Scope);
        }
        drop(config);

        // Gate 5: on-chain re-derivation. The refs only tell us where to
        // look; the ledger decides.
        let month_id = claims.refs.month_id;
        let consumer_id = claims.refs.consumer_id.as_str();

        let consumer = self
            .entities
            .expect_kind(consumer_id, EntityKind::Consumer)
            .map_err(|_| VerifyError::UnknownConsumer(consumer_id.to_string()))?;

        let anchored_root = self
            .ledger
            .anchored_root(month_id)
            .await?
            .ok_or(VerifyError::NotAnchored(month_id))?;

        // The local tree supplies indices and sibling paths; it must
        // agree with the anchored commitment before proofs mean anything.
        match self.settlements.built_root(month_id) {
            Some(local_root) if local_root == anchored_root => {}
            _ => return Err(VerifyError::RootMismatch),
        }

        let proofs = self
            .settlements
            .proofs_for(month_id, consumer_id)
            .map_err(|_| VerifyError::RootMismatch)?;
        if proofs.is_empty() {
            return Err(VerifyError::NoConsumption {
                consumer: consumer_id.to_string(),
                month: month_id,
            });
        }

        let mut units = 0u64;
        for (leaf, path) in &proofs {
            if !verify_proof(leaf.hash(), path, anchored_root) {
                return Err(VerifyError::ProofInvalid);
            }
            units = units.saturating_add(leaf.units);
        }

        let balance = self
            .ledger
            .unit_balance(consumer.eth_address, U256::from(month_id))
            .await?;
        if balance.is_zero() {
            return Err(VerifyError::OwnershipMissing);
        }

        let tx = self.settlements.anchor(month_id).map(|a| a.tx_hash);
        tracing::info!(
            consumer = consumer_id,
            month = month_id,
            units,
            "Token verified against anchored root"
        );

        Ok(VerificationReport {
            verified: true,
            entity: consumer_id.to_string(),
            units,
            month_id,
            tx,
            root: format!("{anchored_root}"),
        })
    }
}

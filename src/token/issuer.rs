//! Token issuance: mint short-lived, single-use verification tokens.

use alloy::primitives::U256;
use arc_swap::ArcSwap;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::types::ChainError;
use crate::chain::wallet::Wallet;
use crate::config::schema::{GatewayConfig, MAX_TOKEN_TTL_SECS, MIN_TOKEN_TTL_SECS};
use crate::entities::{EntityKind, EntityRegistry};
use crate::observability::metrics;
use crate::session::store::{now_unix, QrSession, SessionStore};
use crate::settlement::{MonthId, SettlementStore};
use crate::token::types::{QrToken, SignedToken, TokenError, TokenRefs, TOKEN_TYPE, VERIFY_SCOPE};

/// Errors from token issuance.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The consumer reference is not a registered consumer.
    #[error("unknown consumer '{0}'")]
    UnknownConsumer(String),

    /// No settlement batch exists for the month.
    #[error("no settlement batch for month {0}")]
    UnknownMonth(MonthId),

    /// Claims could not be encoded.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The issuer key could not sign.
    #[error(transparent)]
    Signing(#[from] ChainError),
}

/// A freshly minted token, ready for QR rendering.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: SignedToken,
    /// Wire form for the QR payload.
    pub encoded: String,
    /// Display path including the payload.
    pub redirect: String,
    pub exp: u64,
}

/// Mints signed single-use tokens and records their nonces.
pub struct TokenIssuer {
    wallet: Wallet,
    config: Arc<ArcSwap<GatewayConfig>>,
    sessions: SessionStore,
    entities: EntityRegistry,
    settlements: SettlementStore,
}

impl TokenIssuer {
    pub fn new(
        wallet: Wallet,
        config: Arc<ArcSwap<GatewayConfig>>,
        sessions: SessionStore,
        entities: EntityRegistry,
        settlements: SettlementStore,
    ) -> Self {
        Self {
            wallet,
            config,
            sessions,
            entities,
            settlements,
        }
    }

    /// Address whose signature verifiers must require.
    pub fn issuer_address(&self) -> alloy::primitives::Address {
        self.wallet.address()
    }

    /// Mint a token for a registered consumer and a known month.
    ///
    /// `tx_ref` overrides the settlement reference placed in the refs
    /// block; when absent, the month's anchor transaction is used. The
    /// nonce is recorded with a TTL equal to the expiry window before
    /// the token leaves this function.
    pub async fn issue(
        &self,
        consumer_id: &str,
        month_id: MonthId,
        tx_ref: Option<String>,
    ) -> Result<IssuedToken, IssueError> {
        self.entities
            .expect_kind(consumer_id, EntityKind::Consumer)
            .map_err(|_| IssueError::UnknownConsumer(consumer_id.to_string()))?;

        if !self.settlements.has_month(month_id) {
            return Err(IssueError::UnknownMonth(month_id));
        }

        let config = self.config.load();
        let ttl = config
            .token
            .ttl_secs
            .clamp(MIN_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS);
        let now = now_unix();
        let exp = now + ttl;

        let mut nonce_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = format!("0x{}", hex::encode(nonce_bytes));

        // The signed redirect claim carries the path prefix only; the
        // full display path embeds the encoded token, which cannot be
        // known before signing.
        let claims = QrToken {
            iss: config.token.issuer.clone(),
            aud: config.token.audience.clone(),
            typ: TOKEN_TYPE.to_string(),
            nonce: nonce.clone(),
            exp,
            scope: vec![VERIFY_SCOPE.to_string()],
            refs: TokenRefs {
                consumer_id: consumer_id.to_string(),
                token_id: format!("{:#x}", U256::from(month_id)),
                month_id,
                tx: tx_ref.or_else(|| self.settlements.anchor(month_id).map(|a| a.tx_hash)),
            },
            redirect: format!("{}?qr=", config.token.redirect_path),
        };

        let payload = claims.signing_bytes()?;
        let signature = self.wallet.sign_message(&payload).await?;
        let token = SignedToken {
            claims,
            sig: format!("0x{}", hex::encode(signature.as_bytes())),
        };
        let encoded = token.encode()?;
        let redirect = format!("{}?qr={}", config.token.redirect_path, encoded);

        self.sessions.record(
            &nonce,
            QrSession {
                consumer_id: consumer_id.to_string(),
                month_id,
                expires_at: exp,
            },
        );

        metrics::record_token_issued();
        tracing::info!(
            consumer = consumer_id,
            month = month_id,
            exp,
            "QR token issued"
        );

        Ok(IssuedToken {
            token,
            encoded,
            redirect,
            exp,
        })
    }
}

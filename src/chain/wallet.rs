//! Key management and signing.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//!
//! Two keys exist in a deployment: the token-issuer key (signs QR
//! tokens; its address is the verifier's trust anchor) and the chain
//! submitter key (signs anchor/mint transactions). Both load through
//! this type with different environment variable names.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;

use crate::chain::types::{ChainError, ChainResult};

/// Environment variable holding the transaction submitter key.
pub const CHAIN_KEY_ENV_VAR: &str = "GEC_CHAIN_PRIVATE_KEY";

/// Environment variable holding the token issuer key.
pub const TOKEN_KEY_ENV_VAR: &str = "GEC_TOKEN_SIGNING_KEY";

/// Wallet wrapping a secp256k1 signer.
#[derive(Debug, Clone)]
pub struct Wallet {
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// # Security
    /// The private key is parsed and stored securely. It is never logged.
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> ChainResult<Self> {
        // Strip 0x prefix if present
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Wallet initialized"
        );

        Ok(Self { signer, chain_id })
    }

    /// Load a wallet from the named environment variable.
    pub fn from_env_var(var: &str, chain_id: u64) -> ChainResult<Self> {
        let private_key = std::env::var(var)
            .map_err(|_| ChainError::Wallet(format!("Environment variable {} not set", var)))?;
        Self::from_private_key(&private_key, chain_id)
    }

    /// Get the wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the chain ID this wallet is configured for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Wrap the signer for use in a signing provider.
    pub fn ethereum_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }

    /// Sign a 32-byte hash.
    pub async fn sign_hash(&self, hash: B256) -> ChainResult<alloy::signers::Signature> {
        self.signer
            .sign_hash(&hash)
            .await
            .map_err(|e| ChainError::Wallet(format!("Signing failed: {}", e)))
    }

    /// Sign arbitrary message bytes (with Ethereum prefix).
    pub async fn sign_message(&self, message: &[u8]) -> ChainResult<alloy::signers::Signature> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| ChainError::Wallet(format!("Message signing failed: {}", e)))
    }
}

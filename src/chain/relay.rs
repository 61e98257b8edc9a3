//! Transaction relay: build, sign, broadcast, and confirm.
//!
//! # Responsibilities
//! - Hold the signing provider for the submitter key
//! - Enforce the gas price cap before broadcasting
//! - Submit anchor and mint transactions to the registries
//! - Poll confirmations to the configured depth

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout};

use crate::chain::client::ChainClient;
use crate::chain::registry::{GecUnitRegistry, SettlementRegistry};
use crate::chain::types::{ChainError, ChainResult, ConfirmationStatus};
use crate::chain::wallet::Wallet;
use crate::observability::metrics;
use crate::settlement::MonthId;

/// Signing relay for registry transactions.
pub struct ChainRelay {
    /// Provider with the wallet filler attached; it fills nonce and gas.
    signer_provider: Arc<dyn Provider + Send + Sync>,
    /// Read client used for gas checks and confirmation polling.
    client: ChainClient,
    /// Submitter address, for logging.
    from: Address,
}

impl ChainRelay {
    /// Create a relay from the chain config and submitter wallet.
    pub fn new(client: ChainClient, wallet: Wallet) -> ChainResult<Self> {
        let rpc_url: url::Url = client
            .config()
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Rpc(format!("Invalid RPC URL: {}", e)))?;
        let from = wallet.address();
        let signer_provider = Arc::new(
            ProviderBuilder::new()
                .wallet(wallet.ethereum_wallet())
                .connect_http(rpc_url),
        ) as Arc<dyn Provider + Send + Sync>;

        tracing::info!(submitter = %from, "Chain relay initialized");
        Ok(Self {
            signer_provider,
            client,
            from,
        })
    }

    /// Reject broadcasts while gas is above the configured ceiling, and
    /// return the multiplied price to use otherwise.
    async fn checked_gas_price(&self) -> ChainResult<u128> {
        let gas_price = self.client.gas_price().await?;
        let gas_price_gwei = gas_price / 1_000_000_000;

        let config = self.client.config();
        if gas_price_gwei > config.max_gas_price_gwei as u128 {
            return Err(ChainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: config.max_gas_price_gwei,
            });
        }
        Ok((gas_price as f64 * config.gas_price_multiplier) as u128)
    }

    async fn submit(&self, to: Address, input: Vec<u8>) -> ChainResult<TxHash> {
        let gas_price = self.checked_gas_price().await?;
        let tx = TransactionRequest::default()
            .with_from(self.from)
            .with_to(to)
            .with_input(input)
            .with_gas_price(gas_price)
            .with_chain_id(self.client.config().chain_id);

        let pending = self
            .signer_provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::Rpc(format!("Broadcast failed: {}", e)))?;
        Ok(*pending.tx_hash())
    }

    /// Submit the month's Merkle root to the settlement registry.
    pub async fn submit_anchor(
        &self,
        registry: Address,
        month_id: MonthId,
        root: B256,
    ) -> ChainResult<TxHash> {
        let call = SettlementRegistry::anchorRootCall {
            monthId: U256::from(month_id),
            root,
        };
        let tx_hash = self.submit(registry, call.abi_encode()).await?;
        metrics::record_anchor_submitted();
        tracing::info!(month = month_id, root = %root, tx = %tx_hash, "Anchor submitted");
        Ok(tx_hash)
    }

    /// Mint units for a month to the project's address.
    pub async fn submit_mint(
        &self,
        registry: Address,
        to: Address,
        month_id: MonthId,
        units: u64,
    ) -> ChainResult<TxHash> {
        let call = GecUnitRegistry::mintCall {
            to,
            id: U256::from(month_id),
            amount: U256::from(units),
            data: alloy::primitives::Bytes::new(),
        };
        let tx_hash = self.submit(registry, call.abi_encode()).await?;
        tracing::info!(month = month_id, to = %to, units, tx = %tx_hash, "Mint submitted");
        Ok(tx_hash)
    }

    /// Wait for a transaction to reach the configured confirmation depth.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        timeout_secs: u64,
    ) -> ChainResult<ConfirmationStatus> {
        let required_confirmations = self.client.confirmation_blocks();
        let timeout_duration = Duration::from_secs(timeout_secs);
        let poll_interval = Duration::from_secs(2);

        let result = timeout(timeout_duration, async {
            let mut ticker = interval(poll_interval);

            loop {
                ticker.tick().await;

                let receipt = match self.client.get_transaction_receipt(tx_hash).await? {
                    Some(r) => r,
                    None => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                        continue;
                    }
                };

                if !receipt.status() {
                    return Ok(ConfirmationStatus::Failed(
                        "Transaction reverted".to_string(),
                    ));
                }

                let current_block = self.client.block_number().await?;
                let tx_block = receipt.block_number.unwrap_or(current_block);
                let confirmations = current_block.saturating_sub(tx_block) as u32;

                if confirmations >= required_confirmations {
                    return Ok(ConfirmationStatus::Confirmed {
                        block_number: tx_block,
                    });
                }

                tracing::debug!(
                    tx_hash = %tx_hash,
                    confirmations = confirmations,
                    required = required_confirmations,
                    "Waiting for confirmations"
                );
            }
        })
        .await;

        match result {
            Ok(status) => status,
            Err(_) => Err(ChainError::ConfirmationTimeout(required_confirmations)),
        }
    }

    /// Get the submitter address.
    pub fn address(&self) -> Address {
        self.from
    }
}

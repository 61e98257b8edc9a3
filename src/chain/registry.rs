//! On-chain registry bindings and the ledger read seam.
//!
//! Two contracts back verification: the ERC-1155 unit registry (minted
//! energy units, ownership) and the settlement registry (anchored Merkle
//! roots per month). Reads go through the [`Ledger`] trait so the
//! verifier can be exercised against an in-memory ledger in tests.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::chain::client::ChainClient;
use crate::chain::types::{ChainError, ChainResult};
use crate::config::schema::RetryConfig;
use crate::resilience::retry::with_retries;
use crate::settlement::MonthId;

sol! {
    /// Minted energy units, one ERC-1155 token id per month.
    contract GecUnitRegistry {
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function mint(address to, uint256 id, uint256 amount, bytes data) external;
    }

    /// Anchored settlement commitments.
    contract SettlementRegistry {
        function roots(uint256 monthId) external view returns (bytes32);
        function anchorRoot(uint256 monthId, bytes32 root) external;
    }
}

/// Read access to the on-chain ledger state needed by verification.
///
/// Implemented by [`OnchainLedger`] in production and by an in-memory
/// ledger in the integration tests.
pub trait Ledger: Send + Sync {
    /// Anchored Merkle root for a month, or `None` if never anchored.
    fn anchored_root(&self, month_id: MonthId) -> BoxFuture<'_, ChainResult<Option<B256>>>;

    /// Unit balance of `owner` for the given ERC-1155 token id.
    fn unit_balance(&self, owner: Address, id: U256) -> BoxFuture<'_, ChainResult<U256>>;
}

/// Ledger backed by the chain client and the two registry contracts.
pub struct OnchainLedger {
    client: ChainClient,
    unit_registry: Address,
    settlement_registry: Address,
    retry: RetryConfig,
}

impl OnchainLedger {
    pub fn new(
        client: ChainClient,
        unit_registry: Address,
        settlement_registry: Address,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            unit_registry,
            settlement_registry,
            retry,
        }
    }

    /// The settlement registry address (anchor transactions target it).
    pub fn settlement_registry(&self) -> Address {
        self.settlement_registry
    }

    /// The unit registry address (mint transactions target it).
    pub fn unit_registry(&self) -> Address {
        self.unit_registry
    }

    async fn read_root(&self, month_id: MonthId) -> ChainResult<Option<B256>> {
        let call = SettlementRegistry::rootsCall {
            monthId: U256::from(month_id),
        };
        let tx = TransactionRequest::default()
            .with_to(self.settlement_registry)
            .with_input(call.abi_encode());
        let data = self.client.call(tx).await?;
        let root: B256 = SettlementRegistry::rootsCall::abi_decode_returns(&data)
            .map_err(|e| ChainError::Contract(format!("roots() decode failed: {}", e)))?;
        // The zero root is the contract's "never anchored" sentinel.
        if root == B256::ZERO {
            Ok(None)
        } else {
            Ok(Some(root))
        }
    }

    async fn read_balance(&self, owner: Address, id: U256) -> ChainResult<U256> {
        let call = GecUnitRegistry::balanceOfCall { account: owner, id };
        let tx = TransactionRequest::default()
            .with_to(self.unit_registry)
            .with_input(call.abi_encode());
        let data = self.client.call(tx).await?;
        GecUnitRegistry::balanceOfCall::abi_decode_returns(&data)
            .map_err(|e| ChainError::Contract(format!("balanceOf() decode failed: {}", e)))
    }
}

impl Ledger for OnchainLedger {
    fn anchored_root(&self, month_id: MonthId) -> BoxFuture<'_, ChainResult<Option<B256>>> {
        async move {
            with_retries(&self.retry, "settlement_registry.roots", || {
                self.read_root(month_id)
            })
            .await
        }
        .boxed()
    }

    fn unit_balance(&self, owner: Address, id: U256) -> BoxFuture<'_, ChainResult<U256>> {
        async move {
            with_retries(&self.retry, "unit_registry.balanceOf", || {
                self.read_balance(owner, id)
            })
            .await
        }
        .boxed()
    }
}

/// Ledger used when chain integration is disabled. Every read fails, so
/// verification stays closed.
#[derive(Default)]
pub struct DisabledLedger;

impl Ledger for DisabledLedger {
    fn anchored_root(&self, _month_id: MonthId) -> BoxFuture<'_, ChainResult<Option<B256>>> {
        async {
            Err(ChainError::NotAvailable(
                "chain integration disabled".to_string(),
            ))
        }
        .boxed()
    }

    fn unit_balance(&self, _owner: Address, _id: U256) -> BoxFuture<'_, ChainResult<U256>> {
        async {
            Err(ChainError::NotAvailable(
                "chain integration disabled".to_string(),
            ))
        }
        .boxed()
    }
}

//! Per-month consumption batches, built trees, and anchor records.

use alloy::primitives::{keccak256, B256};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::settlement::merkle::MerkleTree;
use crate::settlement::MonthId;

/// A single consumption record: one Merkle leaf of a settlement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumptionLeaf {
    pub consumer_id: String,
    pub month_id: MonthId,
    pub units: u64,
    /// Position of this record within its month, assigned at insert.
    pub seq: u32,
}

impl ConsumptionLeaf {
    /// Leaf hash: keccak256 over a fixed binary encoding.
    ///
    /// Layout: month (4 BE) | units (8 BE) | seq (4 BE) | consumer bytes.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(16 + self.consumer_id.len());
        buf.extend_from_slice(&self.month_id.to_be_bytes());
        buf.extend_from_slice(&self.units.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(self.consumer_id.as_bytes());
        keccak256(&buf)
    }
}

/// On-chain anchoring outcome for a month.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorRecord {
    /// Root that was submitted.
    pub root: B256,
    /// Transaction reference returned by the chain relay.
    pub tx_hash: String,
}

/// Errors from batch recording, building, and anchoring.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// No leaves recorded for the month.
    #[error("no consumption recorded for month {0}")]
    EmptyBatch(MonthId),

    /// The month's tree has not been built yet.
    #[error("settlement batch for month {0} not built")]
    NotBuilt(MonthId),

    /// The month is already anchored; its batch is frozen.
    #[error("month {0} already anchored")]
    MonthSealed(MonthId),

    /// A consumption record must move at least one unit.
    #[error("consumption of zero units")]
    ZeroUnits,
}

/// A built batch: the tree plus the leaf snapshot it was built from.
///
/// Proofs are taken from the snapshot so indices stay consistent even if
/// the tree is rebuilt later.
struct BuiltBatch {
    tree: MerkleTree,
    leaves: Vec<ConsumptionLeaf>,
}

/// Thread-safe store of settlement state, keyed by month.
#[derive(Clone, Default)]
pub struct SettlementStore {
    leaves: Arc<DashMap<MonthId, Vec<ConsumptionLeaf>>>,
    built: Arc<DashMap<MonthId, BuiltBatch>>,
    anchors: Arc<DashMap<MonthId, AnchorRecord>>,
}

impl SettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a consumption leaf for a month. Fails once the month is
    /// anchored.
    pub fn record_consumption(
        &self,
        consumer_id: &str,
        month_id: MonthId,
        units: u64,
    ) -> Result<ConsumptionLeaf, SettlementError> {
        if units == 0 {
            return Err(SettlementError::ZeroUnits);
        }
        if self.anchors.contains_key(&month_id) {
            return Err(SettlementError::MonthSealed(month_id));
        }
        // The entry guard serializes seq assignment per month.
        let mut entry = self.leaves.entry(month_id).or_default();
        let leaf = ConsumptionLeaf {
            consumer_id: consumer_id.to_string(),
            month_id,
            units,
            seq: entry.len() as u32,
        };
        entry.push(leaf.clone());
        tracing::debug!(
            consumer = %leaf.consumer_id,
            month = month_id,
            units,
            seq = leaf.seq,
            "Consumption recorded"
        );
        Ok(leaf)
    }

    /// Whether any consumption exists for the month.
    pub fn has_month(&self, month_id: MonthId) -> bool {
        self.leaves
            .get(&month_id)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
    }

    /// Build (or rebuild) the month's Merkle tree from its current
    /// leaves. Returns the root and leaf count.
    pub fn build(&self, month_id: MonthId) -> Result<(B256, usize), SettlementError> {
        if self.anchors.contains_key(&month_id) {
            return Err(SettlementError::MonthSealed(month_id));
        }
        let snapshot: Vec<ConsumptionLeaf> = self
            .leaves
            .get(&month_id)
            .map(|l| l.value().clone())
            .unwrap_or_default();
        let hashes: Vec<B256> = snapshot.iter().map(ConsumptionLeaf::hash).collect();
        let tree =
            MerkleTree::from_leaves(hashes).ok_or(SettlementError::EmptyBatch(month_id))?;
        let root = tree.root();
        let count = tree.leaf_count();
        self.built.insert(
            month_id,
            BuiltBatch {
                tree,
                leaves: snapshot,
            },
        );
        tracing::info!(month = month_id, root = %root, leaf_count = count, "Settlement tree built");
        Ok((root, count))
    }

    /// Root of the built tree, if any.
    pub fn built_root(&self, month_id: MonthId) -> Option<B256> {
        self.built.get(&month_id).map(|b| b.tree.root())
    }

    /// Record a successful anchor transaction, sealing the month.
    pub fn record_anchor(
        &self,
        month_id: MonthId,
        root: B256,
        tx_hash: String,
    ) -> Result<(), SettlementError> {
        if self.anchors.contains_key(&month_id) {
            return Err(SettlementError::MonthSealed(month_id));
        }
        self.anchors.insert(month_id, AnchorRecord { root, tx_hash });
        Ok(())
    }

    /// Anchor record for the month, if anchored.
    pub fn anchor(&self, month_id: MonthId) -> Option<AnchorRecord> {
        self.anchors.get(&month_id).map(|r| r.value().clone())
    }

    /// Leaves and inclusion proofs for a consumer's records in a month,
    /// taken from the built snapshot.
    pub fn proofs_for(
        &self,
        month_id: MonthId,
        consumer_id: &str,
    ) -> Result<Vec<(ConsumptionLeaf, Vec<B256>)>, SettlementError> {
        let built = self
            .built
            .get(&month_id)
            .ok_or(SettlementError::NotBuilt(month_id))?;
        let mut out = Vec::new();
        for (index, leaf) in built.leaves.iter().enumerate() {
            if leaf.consumer_id == consumer_id {
                // Index comes from the snapshot, so the path always exists.
                if let Some(path) = built.tree.proof(index) {
                    out.push((leaf.clone(), path));
                }
            }
        }
        Ok(out)
    }

    /// All anchored months for the admin view.
    pub fn anchored_months(&self) -> Vec<(MonthId, AnchorRecord)> {
        let mut months: Vec<(MonthId, AnchorRecord)> = self
            .anchors
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        months.sort_by_key(|(m, _)| *m);
        months
    }

    /// (months with leaves, built trees, anchored months).
    pub fn summary(&self) -> (usize, usize, usize) {
        (self.leaves.len(), self.built.len(), self.anchors.len())
    }
}

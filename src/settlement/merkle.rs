//! Keccak256 Merkle tree for consumption batches.

use alloy::primitives::{keccak256, B256};

/// Hash a pair of nodes in sorted order.
///
/// Sorting makes the hash commutative, so inclusion proofs are just a
/// list of sibling hashes without left/right markers.
pub fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

/// A Merkle tree built over leaf hashes.
///
/// Levels are stored bottom-up; an odd node at the end of a level is
/// promoted unchanged to the next level.
#[derive(Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes. Returns `None` for an empty batch.
    pub fn from_leaves(leaves: Vec<B256>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                match pair {
                    [a, b] => next.push(hash_pair(*a, *b)),
                    [a] => next.push(*a),
                    _ => unreachable!("chunks(2) yields 1 or 2 elements"),
                }
            }
            levels.push(next);
        }
        Some(Self { levels })
    }

    /// The anchored commitment for this batch.
    pub fn root(&self) -> B256 {
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Sibling path for the leaf at `index`, or `None` if out of range.
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut path = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            // A promoted odd node has no sibling at this level.
            if sibling < level.len() {
                path.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(path)
    }
}

/// Check that `leaf` is included under `root` via `proof`.
pub fn verify_proof(leaf: B256, proof: &[B256], root: B256) -> bool {
    let mut acc = leaf;
    for sibling in proof {
        acc = hash_pair(acc, *sibling);
    }
    acc == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<B256> {
        (0..n).map(|i| keccak256([i])).collect()
    }

    #[test]
    fn test_single_leaf_root() {
        let l = leaves(1);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        assert_eq!(tree.root(), l[0]);
        assert!(verify_proof(l[0], &tree.proof(0).unwrap(), tree.root()));
    }

    #[test]
    fn test_empty_batch() {
        assert!(MerkleTree::from_leaves(Vec::new()).is_none());
    }

    #[test]
    fn test_all_leaves_prove_inclusion() {
        for n in [2u8, 3, 4, 5, 7, 8] {
            let l = leaves(n);
            let tree = MerkleTree::from_leaves(l.clone()).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    verify_proof(*leaf, &proof, tree.root()),
                    "leaf {i} of {n} failed"
                );
            }
        }
    }

    #[test]
    fn test_foreign_leaf_rejected() {
        let l = leaves(4);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        let proof = tree.proof(0).unwrap();
        let foreign = keccak256([0xffu8]);
        assert!(!verify_proof(foreign, &proof, tree.root()));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let l = leaves(4);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        let proof = tree.proof(1).unwrap();
        let other_root = keccak256([0xabu8]);
        assert!(!verify_proof(l[1], &proof, other_root));
    }

    #[test]
    fn test_pair_hash_commutative() {
        let a = keccak256([1u8]);
        let b = keccak256([2u8]);
        assert_eq!(hash_pair(a, b), hash_pair(b, a));
    }

    #[test]
    fn test_proof_out_of_range() {
        let tree = MerkleTree::from_leaves(leaves(3)).unwrap();
        assert!(tree.proof(3).is_none());
    }
}

//! Binary Merkle tree over distribution leaves.
//!
//! Leaves are kept in the order they are given (the dataset's dense index
//! order). An unpaired node at the end of a level is promoted unchanged.
//! The root of an empty tree is the zero digest.

use merkledrop_core::{Address, Amount, Digest, ZERO_DIGEST};
use tracing::trace;

use crate::traits::{Committer, KeccakCommitter};

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Sibling digests from the leaf level upward
    pub siblings: Vec<Digest>,
    /// Position of the proven leaf
    pub leaf_index: usize,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] = leaf hashes, last level = [root]
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree using `committer`'s encoding.
    pub fn build<C: Committer + ?Sized>(committer: &C, leaves: &[(Address, Amount)]) -> Self {
        let hashes = leaves
            .iter()
            .enumerate()
            .map(|(i, (address, amount))| committer.hash_leaf(i as u64, address, amount))
            .collect();
        Self::from_leaf_hashes(committer, hashes)
    }

    /// Build a keccak tree from `(address, amount)` entries.
    pub fn from_entries(entries: &[(Address, Amount)]) -> Self {
        Self::build(&KeccakCommitter, entries)
    }

    /// Build from already-hashed leaves.
    pub fn from_leaf_hashes<C: Committer + ?Sized>(committer: &C, hashes: Vec<Digest>) -> Self {
        if hashes.is_empty() {
            return Self { levels: Vec::new() };
        }
        let mut levels = vec![hashes];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let level = &levels[levels.len() - 1];
            let next: Vec<Digest> = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => committer.hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }
        trace!(
            "Built Merkle tree: {} leaves, {} levels",
            levels[0].len(),
            levels.len()
        );
        Self { levels }
    }

    pub fn root(&self) -> Digest {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(ZERO_DIGEST)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn leaf(&self, index: usize) -> Option<Digest> {
        self.levels.first().and_then(|level| level.get(index)).copied()
    }

    /// Sibling path for the leaf at `index`.
    ///
    /// Returns `None` if the index is out of range.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut siblings = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            if sibling < level.len() {
                siblings.push(level[sibling]);
            }
            position /= 2;
        }
        Some(MerkleProof {
            siblings,
            leaf_index: index,
        })
    }

    /// Verify a keccak leaf digest against `root`.
    pub fn verify(root: &Digest, leaf: &Digest, proof: &MerkleProof) -> bool {
        let c = KeccakCommitter;
        let computed = proof
            .siblings
            .iter()
            .fold(*leaf, |acc, sibling| c.hash_pair(&acc, sibling));
        &computed == root
    }
}

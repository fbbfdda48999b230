//! Committer trait for pluggable commitment backends.
//!
//! A committer fixes the leaf and node encoding. Tree shape, proof
//! extraction and verification are shared, so any implementation that
//! honours the encoding contract can replace the keccak default.

use sha3::{Digest as _, Keccak256};

use merkledrop_core::{Address, Amount, Digest};

use crate::merkle::MerkleTree;

/// Pluggable commitment encoding.
pub trait Committer: Send + Sync {
    /// Hash one `(index, recipient, amount)` leaf.
    fn hash_leaf(&self, index: u64, address: &Address, amount: &Amount) -> Digest;

    /// Combine two child digests into their parent.
    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest;

    /// Build a tree over `leaves`; leaf `i` is committed at index `i`.
    fn commit(&self, leaves: &[(Address, Amount)]) -> MerkleTree {
        MerkleTree::build(self, leaves)
    }

    /// Recompute the root from one leaf and its sibling path.
    fn verify(
        &self,
        root: &Digest,
        index: u64,
        address: &Address,
        amount: &Amount,
        proof: &[Digest],
    ) -> bool {
        let computed = proof
            .iter()
            .fold(self.hash_leaf(index, address, amount), |acc, sibling| {
                self.hash_pair(&acc, sibling)
            });
        &computed == root
    }
}

/// Keccak-256 committer.
///
/// Leaf: `keccak256(keccak256(uint256(index) ‖ address[20] ‖ uint256(amount)))`,
/// all integers big-endian. Nodes: `keccak256(min(a, b) ‖ max(a, b))`.
/// The double hash keeps a 64-byte internal node from ever being
/// reinterpreted as a leaf preimage.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeccakCommitter;

impl Committer for KeccakCommitter {
    fn hash_leaf(&self, index: u64, address: &Address, amount: &Amount) -> Digest {
        let mut index_word = [0u8; 32];
        index_word[24..].copy_from_slice(&index.to_be_bytes());
        let mut amount_word = [0u8; 32];
        amount.to_big_endian(&mut amount_word);

        let inner = Keccak256::new()
            .chain_update(index_word)
            .chain_update(address.as_bytes())
            .chain_update(amount_word)
            .finalize();
        Keccak256::digest(inner).into()
    }

    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest {
        let (lo, hi) = if left <= right { (left, right) } else { (right, left) };
        Keccak256::new()
            .chain_update(lo)
            .chain_update(hi)
            .finalize()
            .into()
    }
}

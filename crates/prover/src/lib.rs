//! MerkleDrop Prover
//!
//! Binary Merkle tree and pluggable committer trait for distribution
//! commitments.
//!
//! The `MerkleTree` is used by the aggregator (to build distribution roots
//! and per-recipient proofs), by the reconciliation checker (to recompute a
//! published root) and by the settlement ledger (to verify claims). The
//! `Committer` trait abstracts the leaf/node encoding so another hashing
//! backend can be swapped in.

pub mod merkle;
pub mod traits;

pub use merkle::{MerkleProof, MerkleTree};
pub use traits::{Committer, KeccakCommitter};

use merkledrop_core::{Address, Amount, Digest};

/// Keccak leaf digest for `(index, address, amount)`.
pub fn merkle_leaf(index: u64, address: &Address, amount: &Amount) -> Digest {
    KeccakCommitter.hash_leaf(index, address, amount)
}

/// Keccak sorted-pair node digest.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    KeccakCommitter.hash_pair(left, right)
}

/// Proof verification primitive.
///
/// Recomputes the root from the leaf `(index, address, amount)` and the
/// sibling path and compares it with `root`.
pub fn verify_proof(
    root: &Digest,
    index: u64,
    address: &Address,
    amount: &Amount,
    proof: &[Digest],
) -> bool {
    KeccakCommitter.verify(root, index, address, amount, proof)
}

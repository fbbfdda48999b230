//! Commitment builder: dataset entries → root, tree and claim material.

use serde::{Deserialize, Serialize};

use merkledrop_core::{
    decimal, hex_digest, Address, Amount, DatasetEntry, Digest, DistributionDataset,
};
use merkledrop_prover::{Committer, MerkleTree};

use crate::Result;

/// Everything a recipient needs to claim: `(index, amount, proof)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimBundle {
    pub address: Address,
    pub index: u64,
    #[serde(with = "decimal")]
    pub amount: Amount,
    #[serde(with = "hex_proof")]
    pub proof: Vec<Digest>,
}

mod hex_proof {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use merkledrop_core::{digest_from_hex, digest_to_hex, Digest};

    pub fn serialize<S: Serializer>(proof: &[Digest], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(proof.len()))?;
        for digest in proof {
            seq.serialize_element(&digest_to_hex(digest))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Digest>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| digest_from_hex(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// A dataset together with the tree committing to it
#[derive(Debug, Clone)]
pub struct Commitment {
    dataset: DistributionDataset,
    tree: MerkleTree,
}

impl Commitment {
    /// Commit to index-ordered `entries`; the root is recorded in the
    /// resulting dataset.
    pub fn build(
        committer: &dyn Committer,
        token: Option<Address>,
        entries: Vec<DatasetEntry>,
    ) -> Result<Self> {
        let leaves: Vec<(Address, Amount)> =
            entries.iter().map(|e| (e.address, e.amount)).collect();
        let tree = committer.commit(&leaves);
        let dataset = DistributionDataset::from_entries(token, tree.root(), entries)?;
        Ok(Self { dataset, tree })
    }

    /// Rebuild the tree behind an existing dataset.
    ///
    /// The dataset's declared root is kept as-is; compare it with
    /// [`Commitment::root`] to detect a mismatch.
    pub fn from_dataset(committer: &dyn Committer, dataset: DistributionDataset) -> Self {
        let tree = committer.commit(&dataset.leaves());
        Self { dataset, tree }
    }

    /// Root recomputed from the entries
    pub fn root(&self) -> Digest {
        self.tree.root()
    }

    pub fn dataset(&self) -> &DistributionDataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> DistributionDataset {
        self.dataset
    }

    pub fn total(&self) -> Amount {
        self.dataset.total_amount
    }

    /// Claim material for `address`, if it is in the dataset.
    pub fn claim(&self, address: &Address) -> Option<ClaimBundle> {
        let entry = self.dataset.get(address)?;
        let proof = self.tree.proof(entry.index as usize)?;
        Some(ClaimBundle {
            address: entry.address,
            index: entry.index,
            amount: entry.amount,
            proof: proof.siblings,
        })
    }

    /// Claim material for every recipient, in index order
    pub fn claim_bundles(&self) -> Vec<ClaimBundle> {
        self.dataset
            .entries()
            .iter()
            .filter_map(|entry| self.claim(&entry.address))
            .collect()
    }
}

//! Reconciliation checker.
//!
//! Cross-checks ledger state against the stored dataset before a ledger
//! mutation is submitted. Nothing here trusts a number it can recompute.

use std::sync::Arc;

use tracing::{debug, warn};

use merkledrop_core::{checked_sum, Amount, DistributionDataset};
use merkledrop_prover::Committer;
use merkledrop_settlement::DistributionRecord;

use crate::commitment::Commitment;
use crate::{AggregatorError, Result};

#[derive(Clone)]
pub struct Checker {
    committer: Arc<dyn Committer>,
}

impl Checker {
    pub fn new(committer: Arc<dyn Committer>) -> Self {
        Self { committer }
    }

    /// Verify that `dataset` is the one `record` commits to.
    ///
    /// The root is recomputed from the entries and compared with the
    /// ledger's root, then the dataset's declared root and total are
    /// compared with the ledger's.
    pub fn verify_published(
        &self,
        record: &DistributionRecord,
        dataset: &DistributionDataset,
    ) -> Result<()> {
        let computed = self.committer.commit(&dataset.leaves()).root();
        if computed != record.merkle_root {
            warn!(
                "Root mismatch for {}: ledger {}, recomputed {}",
                record.token.short(),
                hex::encode(&record.merkle_root[..8]),
                hex::encode(&computed[..8]),
            );
            return Err(AggregatorError::RootMismatch {
                expected: record.merkle_root,
                computed,
            });
        }
        if dataset.merkle_root != record.merkle_root {
            return Err(AggregatorError::RootMismatch {
                expected: record.merkle_root,
                computed: dataset.merkle_root,
            });
        }
        self.check_total(dataset, record.total_amount)?;

        debug!(
            "Published dataset for {} verified ({} recipients)",
            record.token.short(),
            dataset.len()
        );
        Ok(())
    }

    /// Verify a freshly built commitment's declared root.
    pub fn verify_commitment(&self, commitment: &Commitment) -> Result<()> {
        let dataset = commitment.dataset();
        let computed = self.committer.commit(&dataset.leaves()).root();
        if computed != dataset.merkle_root {
            return Err(AggregatorError::RootMismatch {
                expected: dataset.merkle_root,
                computed,
            });
        }
        Ok(())
    }

    /// Independently sum `dataset` and compare with `submitted`.
    pub fn check_total(&self, dataset: &DistributionDataset, submitted: Amount) -> Result<()> {
        let computed = checked_sum(dataset.entries().iter().map(|e| &e.amount))?;
        if computed != submitted {
            warn!("Total mismatch: dataset sums to {computed}, submitting {submitted}");
            return Err(AggregatorError::TotalMismatch {
                computed,
                submitted,
            });
        }
        Ok(())
    }
}

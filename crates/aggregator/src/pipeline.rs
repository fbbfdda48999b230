//! Distribution cycle orchestration.
//!
//! `Distributor` wires the allocation delta, the reconciler, the
//! commitment builder and the checker to a dataset store and a ledger
//! client. Everything before the ledger submission is side-effect free
//! apart from content-addressed (idempotent) store writes, so a cycle can
//! be abandoned at any point before `submit`.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use merkledrop_core::{
    checked_sum, Address, Amount, DatasetEntry, Digest, DistributionDataset, StoragePointer,
};
use merkledrop_prover::{Committer, KeccakCommitter};
use merkledrop_settlement::{
    DistributionRecord, LedgerClient, LedgerError, Payee, Transition, TxReceipt,
};
use merkledrop_store::DatasetStore;

use crate::allocation::AllocationOutcome;
use crate::checker::Checker;
use crate::commitment::{ClaimBundle, Commitment};
use crate::reconcile::{reconcile, verify_transition};
use crate::{AggregatorError, Result};

/// Default number of claimed-counter queries per batch
pub const DEFAULT_QUERY_BATCH_SIZE: usize = 100;

/// A computed but not yet submitted add/update
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub token: Address,
    /// Ledger root the update was computed against (`None` for a new
    /// distribution)
    pub base_root: Option<Digest>,
    /// Dataset the update was merged into
    pub previous: DistributionDataset,
    pub commitment: Commitment,
    /// Sum of the delta
    pub delta_total: Amount,
    /// Total to submit: previous total plus delta total
    pub total_amount: Amount,
}

impl PreparedUpdate {
    pub fn is_new(&self) -> bool {
        self.base_root.is_none()
    }
}

/// A distribution state committed to the ledger
#[derive(Debug, Clone)]
pub struct Published {
    pub token: Address,
    pub root: Digest,
    pub storage_pointer: StoragePointer,
    pub total_amount: Amount,
    pub receipt: TxReceipt,
}

#[derive(Debug, Clone)]
pub struct WithdrawalOutcome {
    pub token: Address,
    pub root: Digest,
    pub storage_pointer: StoragePointer,
    /// New total: the sum of claimed counters
    pub total_claimed: Amount,
    /// Amount released to the treasury
    pub withdrawn: Amount,
    /// Recipients kept in the claimed-only dataset
    pub recipients: usize,
    pub receipt: TxReceipt,
}

pub struct Distributor {
    store: Arc<dyn DatasetStore>,
    ledger: Arc<dyn LedgerClient>,
    committer: Arc<dyn Committer>,
    checker: Checker,
    query_batch_size: usize,
}

impl Distributor {
    pub fn new(store: Arc<dyn DatasetStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self::with_committer(store, ledger, Arc::new(KeccakCommitter))
    }

    pub fn with_committer(
        store: Arc<dyn DatasetStore>,
        ledger: Arc<dyn LedgerClient>,
        committer: Arc<dyn Committer>,
    ) -> Self {
        Self {
            store,
            ledger,
            checker: Checker::new(committer.clone()),
            committer,
            query_batch_size: DEFAULT_QUERY_BATCH_SIZE,
        }
    }

    /// Set the claimed-counter query batch size (clamped to at least 1).
    pub fn with_query_batch_size(mut self, size: usize) -> Self {
        self.query_batch_size = size.max(1);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn DatasetStore> {
        &self.store
    }

    // ==================== Distribution cycle ====================

    /// Allocate → reconcile → commit, without touching the ledger.
    pub async fn prepare_update(
        &self,
        token: Address,
        delta: &AllocationOutcome,
    ) -> Result<PreparedUpdate> {
        let record = self.ledger.distribution(&token).await?;
        if record.as_ref().map_or(false, |r| r.paused) {
            return Err(LedgerError::Paused(token).into());
        }

        let previous = match &record {
            Some(record) => self.fetch_verified(record).await?,
            None => DistributionDataset::empty(),
        };

        let reconciliation = reconcile(&previous, delta)?;
        let commitment = Commitment::build(
            self.committer.as_ref(),
            Some(token),
            reconciliation.entries,
        )?;
        let total_amount = previous
            .total_amount
            .checked_add(reconciliation.delta_total)
            .ok_or(merkledrop_core::CoreError::AmountOverflow)?;

        info!(
            "Prepared {} for {} (root: {}, total: {}, recipients: {})",
            if record.is_some() { "update" } else { "add" },
            token.short(),
            hex::encode(&commitment.root()[..8]),
            total_amount,
            commitment.dataset().len(),
        );

        Ok(PreparedUpdate {
            token,
            base_root: record.map(|r| r.merkle_root),
            previous,
            commitment,
            delta_total: reconciliation.delta_total,
            total_amount,
        })
    }

    /// Check a prepared update, store its dataset and submit it.
    pub async fn publish(&self, prepared: PreparedUpdate) -> Result<Published> {
        let token = prepared.token;
        let record = self.ledger.distribution(&token).await?;

        match (&record, prepared.base_root) {
            (Some(record), _) if record.paused => return Err(LedgerError::Paused(token).into()),
            (Some(record), Some(base)) if record.merkle_root != base => {
                return Err(AggregatorError::RootMismatch {
                    expected: record.merkle_root,
                    computed: base,
                })
            }
            (Some(_), None) => return Err(LedgerError::AlreadyExists(token).into()),
            (None, Some(_)) => return Err(LedgerError::NotFound(token).into()),
            _ => {}
        }

        let dataset = prepared.commitment.dataset();
        verify_transition(&prepared.previous, dataset.entries(), prepared.delta_total)?;
        self.checker.verify_commitment(&prepared.commitment)?;
        self.checker.check_total(dataset, prepared.total_amount)?;

        let storage_pointer = self.store.put(dataset).await?;
        let root = dataset.merkle_root;
        let total_amount = prepared.total_amount;

        let transition = if prepared.is_new() {
            Transition::Add {
                token,
                root,
                storage_pointer,
                total_amount,
            }
        } else {
            Transition::Update {
                token,
                expected_root: prepared.base_root,
                root,
                storage_pointer,
                total_amount,
            }
        };
        let receipt = self.ledger.submit(transition).await?;

        info!(
            "Published distribution for {} (root: {}, pointer: {}, total: {})",
            token.short(),
            hex::encode(&root[..8]),
            storage_pointer.short(),
            total_amount,
        );

        Ok(Published {
            token,
            root,
            storage_pointer,
            total_amount,
            receipt,
        })
    }

    /// Run one full distribution cycle for `token`.
    pub async fn distribute(&self, token: Address, delta: &AllocationOutcome) -> Result<Published> {
        let prepared = self.prepare_update(token, delta).await?;
        self.publish(prepared).await
    }

    // ==================== Withdrawal ====================

    /// Pause (if needed), shrink the commitment to claimed amounts and
    /// withdraw the unclaimed remainder.
    pub async fn withdraw(&self, token: Address) -> Result<WithdrawalOutcome> {
        let record = self.require_distribution(&token).await?;
        if record.paused {
            info!("Distribution for {} already paused", token.short());
        } else {
            self.ledger
                .submit(Transition::PauseForWithdrawal { token })
                .await?;
        }

        let record = self.require_distribution(&token).await?;
        let dataset = self.fetch_verified(&record).await?;

        let recipients: Vec<Address> = dataset.entries().iter().map(|e| e.address).collect();
        let claimed = self.query_claimed(&token, &recipients).await?;

        let mut entries = Vec::new();
        for (entry, claimed) in dataset.entries().iter().zip(claimed) {
            let kept = claimed.min(entry.amount);
            if !kept.is_zero() {
                entries.push(DatasetEntry::new(entry.address, entries.len() as u64, kept));
            }
        }
        let total_claimed = checked_sum(entries.iter().map(|e| &e.amount))?;
        info!(
            "Withdrawal for {}: {} of {} recipients claimed {} of {}",
            token.short(),
            entries.len(),
            dataset.len(),
            total_claimed,
            record.total_amount,
        );

        let commitment = Commitment::build(self.committer.as_ref(), Some(token), entries)?;
        self.checker.check_total(commitment.dataset(), record.total_claimed)?;

        let storage_pointer = self.store.put(commitment.dataset()).await?;
        let root = commitment.root();
        let receipt = self
            .ledger
            .submit(Transition::WithdrawUnclaimed {
                token,
                root,
                storage_pointer,
                total_amount: total_claimed,
            })
            .await?;

        let withdrawn = receipt
            .transfers
            .iter()
            .filter(|t| t.to == Payee::Treasury)
            .fold(Amount::zero(), |acc, t| acc.saturating_add(t.amount));

        Ok(WithdrawalOutcome {
            token,
            root,
            storage_pointer,
            total_claimed,
            withdrawn,
            recipients: commitment.dataset().len(),
            receipt,
        })
    }

    /// Claimed counters for `recipients`, queried in concurrent batches.
    pub async fn query_claimed(
        &self,
        token: &Address,
        recipients: &[Address],
    ) -> Result<Vec<Amount>> {
        let batches = recipients.chunks(self.query_batch_size).map(|batch| {
            let ledger = self.ledger.clone();
            async move { ledger.claimed_batch(token, batch).await }
        });
        let results = try_join_all(batches).await?;
        debug!(
            "Queried {} claimed counters in {} batches",
            recipients.len(),
            results.len()
        );
        Ok(results.into_iter().flatten().collect())
    }

    // ==================== Queries ====================

    /// Verified commitment behind the token's current ledger state.
    pub async fn current_commitment(&self, token: &Address) -> Result<Commitment> {
        let record = self.require_distribution(token).await?;
        let dataset = self.fetch_verified(&record).await?;
        Ok(Commitment::from_dataset(self.committer.as_ref(), dataset))
    }

    /// Claim material for `address` under the current commitment.
    pub async fn claim_bundle(&self, token: &Address, address: &Address) -> Result<ClaimBundle> {
        self.current_commitment(token)
            .await?
            .claim(address)
            .ok_or(AggregatorError::UnknownRecipient(*address))
    }

    async fn require_distribution(&self, token: &Address) -> Result<DistributionRecord> {
        self.ledger
            .distribution(token)
            .await?
            .ok_or_else(|| LedgerError::NotFound(*token).into())
    }

    async fn fetch_verified(&self, record: &DistributionRecord) -> Result<DistributionDataset> {
        let dataset = self.store.get(record.storage_pointer).await?;
        self.checker.verify_published(record, &dataset)?;
        Ok(dataset)
    }
}

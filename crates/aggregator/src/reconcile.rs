//! Tree reconciler: previous dataset + delta → next dataset entries.
//!
//! Updates are additive. Every previous recipient is carried forward with
//! its delta (if any) added on top; recipients only in the delta are
//! appended in delta order. Indices are reassigned densely from 0 in that
//! order.
//!
//! Before anything is returned the transition is verified against the
//! previous dataset: no recipient may disappear or decrease, and the new
//! total must equal the old total plus the delta total exactly.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use merkledrop_core::{checked_sum, Address, Amount, CoreError, DatasetEntry, DistributionDataset};

use crate::allocation::AllocationOutcome;
use crate::{AggregatorError, Result};

/// Next dataset contents and the totals they were checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Dense, index-ordered entries for the next commitment
    pub entries: Vec<DatasetEntry>,
    pub old_total: Amount,
    pub delta_total: Amount,
    pub new_total: Amount,
}

impl Reconciliation {
    pub fn new_recipients(&self, previous: &DistributionDataset) -> usize {
        self.entries
            .iter()
            .filter(|e| previous.get(&e.address).is_none())
            .count()
    }
}

/// Merge `delta` into `previous`.
pub fn reconcile(
    previous: &DistributionDataset,
    delta: &AllocationOutcome,
) -> Result<Reconciliation> {
    let mut entries: Vec<DatasetEntry> = Vec::with_capacity(previous.len() + delta.balances.len());

    for old in previous.entries() {
        let mut entry = DatasetEntry::new(old.address, entries.len() as u64, old.amount);
        entry.breakdown = old.breakdown.clone();
        if let Some(added) = delta.balances.get(&old.address) {
            entry.amount = entry
                .amount
                .checked_add(added)
                .ok_or(CoreError::AmountOverflow)?;
            merge_breakdown(&mut entry.breakdown, delta.breakdown_of(&old.address))?;
        }
        entries.push(entry);
    }

    for (address, amount) in delta.balances.iter() {
        if previous.get(address).is_some() || amount.is_zero() {
            continue;
        }
        let mut entry = DatasetEntry::new(*address, entries.len() as u64, *amount);
        merge_breakdown(&mut entry.breakdown, delta.breakdown_of(address))?;
        entries.push(entry);
    }

    let delta_total = delta.total()?;
    let reconciliation = Reconciliation {
        old_total: checked_sum(previous.entries().iter().map(|e| &e.amount))?,
        new_total: checked_sum(entries.iter().map(|e| &e.amount))?,
        delta_total,
        entries,
    };
    verify_transition(previous, &reconciliation.entries, delta_total)?;

    info!(
        "Reconciled {} previous + {} new recipients (total {} + {} = {})",
        previous.len(),
        reconciliation.new_recipients(previous),
        reconciliation.old_total,
        reconciliation.delta_total,
        reconciliation.new_total,
    );
    Ok(reconciliation)
}

/// Check the invariants between a previous dataset and proposed entries.
///
/// Fails with `MissingRecipient` if a previous recipient is absent,
/// `Monotonicity` if one decreased, and `Conservation` unless
/// `sum(next) - sum(previous) == delta_total`.
pub fn verify_transition(
    previous: &DistributionDataset,
    next: &[DatasetEntry],
    delta_total: Amount,
) -> Result<()> {
    let next_amounts: BTreeMap<Address, Amount> =
        next.iter().map(|e| (e.address, e.amount)).collect();

    for old in previous.entries() {
        let new_amount = match next_amounts.get(&old.address) {
            Some(amount) => *amount,
            None => {
                warn!("Recipient {} missing from next dataset", old.address.short());
                return Err(AggregatorError::MissingRecipient(old.address));
            }
        };
        if new_amount < old.amount {
            warn!(
                "Recipient {} decreased from {} to {}",
                old.address.short(),
                old.amount,
                new_amount
            );
            return Err(AggregatorError::Monotonicity {
                recipient: old.address,
                old: old.amount,
                new: new_amount,
            });
        }
    }

    let old_total = checked_sum(previous.entries().iter().map(|e| &e.amount))?;
    let new_total = checked_sum(next.iter().map(|e| &e.amount))?;
    let conserved = new_total
        .checked_sub(old_total)
        .map_or(false, |grown| grown == delta_total);
    if !conserved {
        warn!(
            "Conservation failed: {} - {} != {}",
            new_total, old_total, delta_total
        );
        return Err(AggregatorError::Conservation {
            old_total,
            delta_total,
            new_total,
        });
    }

    debug!("Transition verified over {} entries", next.len());
    Ok(())
}

fn merge_breakdown(
    into: &mut BTreeMap<String, Amount>,
    from: Option<&BTreeMap<String, Amount>>,
) -> Result<()> {
    for (label, amount) in from.into_iter().flatten() {
        let slot = into.entry(label.clone()).or_default();
        *slot = slot.checked_add(*amount).ok_or(CoreError::AmountOverflow)?;
    }
    Ok(())
}

//! MerkleDrop Aggregator
//!
//! Off-chain side of a distribution cycle:
//!
//! 1. **Allocate**: raw balance snapshots become one recipient → amount
//!    delta (`allocation`).
//! 2. **Reconcile**: the delta is merged additively into the dataset the
//!    ledger currently points to (`reconcile`).
//! 3. **Commit**: the merged dataset is committed to a Merkle root with
//!    per-recipient claim material (`commitment`).
//! 4. **Check**: the stored dataset, the new commitment and the submitted
//!    totals are cross-checked (`checker`).
//! 5. **Publish**: the dataset is stored and the ledger updated
//!    (`pipeline::Distributor`).
//!
//! Withdrawal of unclaimed tokens runs through the same store, checker and
//! ledger client.

pub mod allocation;
pub mod checker;
pub mod commitment;
pub mod pipeline;
pub mod reconcile;

pub use allocation::{
    allocate, AllocationConfig, AllocationOutcome, BalanceSource, Bonus, ResidualPolicy,
    ScalingRule,
};
pub use checker::Checker;
pub use commitment::{ClaimBundle, Commitment};
pub use pipeline::{
    Distributor, PreparedUpdate, Published, WithdrawalOutcome, DEFAULT_QUERY_BATCH_SIZE,
};
pub use reconcile::{reconcile, verify_transition, Reconciliation};

use merkledrop_core::{Address, Amount, CoreError, Digest};
use merkledrop_settlement::LedgerError;
use merkledrop_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Invalid input data: {0}")]
    InvalidInputData(String),

    #[error("Degenerate distribution: {0}")]
    DegenerateDistribution(String),

    #[error("Amount for {recipient} would decrease from {old} to {new}")]
    Monotonicity {
        recipient: Address,
        old: Amount,
        new: Amount,
    },

    #[error("Totals do not reconcile: {new_total} - {old_total} != {delta_total}")]
    Conservation {
        old_total: Amount,
        delta_total: Amount,
        new_total: Amount,
    },

    #[error("Recipient {0} missing from the next dataset")]
    MissingRecipient(Address),

    #[error(
        "Merkle root mismatch: expected {}, computed {}",
        hex::encode(expected),
        hex::encode(computed)
    )]
    RootMismatch { expected: Digest, computed: Digest },

    #[error("Total mismatch: dataset sums to {computed}, submitted {submitted}")]
    TotalMismatch { computed: Amount, submitted: Amount },

    #[error("Recipient {0} is not in the distribution")]
    UnknownRecipient(Address),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Core error: {0}")]
    Core(CoreError),
}

impl From<CoreError> for AggregatorError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidInputData(msg) | CoreError::InvalidAddress(msg) => {
                AggregatorError::InvalidInputData(msg)
            }
            other => AggregatorError::Core(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

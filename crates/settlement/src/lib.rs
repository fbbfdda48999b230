//! MerkleDrop Settlement
//!
//! The distribution ledger: the authoritative state machine that records one
//! distribution per token and one claimed-amount counter per
//! (token, recipient).
//!
//! ## Distribution Lifecycle
//!
//! 1. **Add**: a token with no record gets its first commitment root,
//!    dataset pointer and total. The record starts `Active`.
//! 2. **Claim**: a recipient presents `(index, cumulative amount, proof)`.
//!    The ledger verifies the proof against the current root and pays out
//!    the increment over what the recipient already claimed.
//! 3. **Update**: the root is replaced by a commitment to a larger
//!    cumulative dataset. Recipients re-claim the difference.
//! 4. **Pause**: claims stop so the claimed counters are stable.
//! 5. **Withdraw**: a commitment restricted to what was already claimed
//!    replaces the root, the unclaimed remainder goes to the treasury and
//!    the record is `Active` again.
//!
//! `DistributionLedger` is the pure state machine; `LedgerClient` is the
//! submission interface, with `LocalLedgerClient` as a persisted local
//! implementation.

mod client;
mod ledger;
mod types;

pub use client::{LedgerClient, LocalLedgerClient};
pub use ledger::{DistributionLedger, LedgerState};
pub use types::*;

use merkledrop_core::{Address, Amount, CoreError, Digest};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Distribution already exists for token {0}")]
    AlreadyExists(Address),

    #[error("Distribution not found for token {0}")]
    NotFound(Address),

    #[error("Distribution for token {0} is paused")]
    Paused(Address),

    #[error("Distribution for token {0} is already paused")]
    AlreadyPaused(Address),

    #[error("Distribution for token {0} is not paused")]
    NotPaused(Address),

    #[error("Invalid proof for {recipient} on token {token}")]
    InvalidProof { token: Address, recipient: Address },

    #[error("Nothing to claim for {recipient} on token {token}")]
    NothingToClaim { token: Address, recipient: Address },

    #[error("Claim of {requested} on token {token} exceeds remaining distribution {remaining}")]
    ExceedsDistribution {
        token: Address,
        requested: Amount,
        remaining: Amount,
    },

    #[error("Total for token {token} cannot decrease from {current} to {proposed}")]
    TotalDecreased {
        token: Address,
        current: Amount,
        proposed: Amount,
    },

    #[error("Accounting mismatch on token {token}: claimed {claimed}, submitted {submitted}")]
    AccountingMismatch {
        token: Address,
        claimed: Amount,
        submitted: Amount,
    },

    #[error(
        "Stale update for token {token}: built on {}, ledger is at {}",
        hex::encode(expected),
        hex::encode(current)
    )]
    StaleRoot {
        token: Address,
        expected: Digest,
        current: Digest,
    },

    #[error("Batch length mismatch")]
    LengthMismatch,

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Amount overflow")]
    AmountOverflow,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<CoreError> for LedgerError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::AmountOverflow => LedgerError::AmountOverflow,
            other => LedgerError::SerializationError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

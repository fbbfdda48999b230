//! Ledger types: distribution records, transitions, transfers and events

use serde::{Deserialize, Serialize};

use merkledrop_core::{decimal, hex_digest, Address, Amount, Digest, StoragePointer};

/// Lifecycle state of a token's distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionState {
    /// No record
    Unknown,
    /// Has a commitment, accepting claims
    Active,
    /// Commitment frozen, claims rejected, withdrawal permitted
    Paused,
}

/// On-ledger distribution record, one per token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRecord {
    pub token: Address,
    pub paused: bool,
    /// Current commitment root
    #[serde(with = "hex_digest")]
    pub merkle_root: Digest,
    /// Pointer to the dataset behind `merkle_root`
    pub storage_pointer: StoragePointer,
    /// Total amount committed to recipients
    #[serde(with = "decimal")]
    pub total_amount: Amount,
    /// Sum of all claimed-amount counters for this token
    #[serde(with = "decimal")]
    pub total_claimed: Amount,
}

impl DistributionRecord {
    pub fn state(&self) -> DistributionState {
        if self.paused {
            DistributionState::Paused
        } else {
            DistributionState::Active
        }
    }

    /// Amount committed but not yet claimed
    pub fn unclaimed(&self) -> Amount {
        self.total_amount.saturating_sub(self.total_claimed)
    }
}

/// One claim against one token's commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub token: Address,
    /// Leaf index of the recipient in the committed dataset
    pub index: u64,
    pub recipient: Address,
    /// Cumulative amount committed to the recipient
    pub amount: Amount,
    pub proof: Vec<Digest>,
}

/// A prepared ledger transition with concrete arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Add {
        token: Address,
        root: Digest,
        storage_pointer: StoragePointer,
        total_amount: Amount,
    },
    Update {
        token: Address,
        /// Root the update was derived from; the ledger refuses the update
        /// if its current root differs
        expected_root: Option<Digest>,
        root: Digest,
        storage_pointer: StoragePointer,
        total_amount: Amount,
    },
    PauseForWithdrawal {
        token: Address,
    },
    WithdrawUnclaimed {
        token: Address,
        root: Digest,
        storage_pointer: StoragePointer,
        total_amount: Amount,
    },
    Claim(ClaimRequest),
    /// Claims for one recipient across several tokens, all-or-nothing.
    ///
    /// The parallel vectors must have equal lengths.
    ClaimBatch {
        recipient: Address,
        tokens: Vec<Address>,
        indices: Vec<u64>,
        amounts: Vec<Amount>,
        proofs: Vec<Vec<Digest>>,
    },
}

impl Transition {
    /// Token(s) this transition touches
    pub fn tokens(&self) -> Vec<Address> {
        match self {
            Transition::Add { token, .. }
            | Transition::Update { token, .. }
            | Transition::PauseForWithdrawal { token }
            | Transition::WithdrawUnclaimed { token, .. } => vec![*token],
            Transition::Claim(claim) => vec![claim.token],
            Transition::ClaimBatch { tokens, .. } => tokens.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Add { .. } => "add",
            Transition::Update { .. } => "update",
            Transition::PauseForWithdrawal { .. } => "pauseForWithdrawal",
            Transition::WithdrawUnclaimed { .. } => "withdrawUnclaimedTokens",
            Transition::Claim(_) => "claim",
            Transition::ClaimBatch { .. } => "claimBatch",
        }
    }
}

/// Destination of a token transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payee {
    Recipient(Address),
    /// Ledger owner (receives withdrawn unclaimed balances)
    Treasury,
}

/// Token movement signalled by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub token: Address,
    pub to: Payee,
    #[serde(with = "decimal")]
    pub amount: Amount,
}

/// Append-only record of applied transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    DistributionAdded {
        token: Address,
        #[serde(with = "hex_digest")]
        merkle_root: Digest,
        storage_pointer: StoragePointer,
        #[serde(with = "decimal")]
        total_amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    DistributionUpdated {
        token: Address,
        #[serde(with = "hex_digest")]
        merkle_root: Digest,
        storage_pointer: StoragePointer,
        #[serde(with = "decimal")]
        total_amount: Amount,
    },
    DistributionPaused { token: Address },
    #[serde(rename_all = "camelCase")]
    UnclaimedWithdrawn {
        token: Address,
        #[serde(with = "hex_digest")]
        merkle_root: Digest,
        storage_pointer: StoragePointer,
        #[serde(with = "decimal")]
        total_amount: Amount,
        #[serde(with = "decimal")]
        withdrawn: Amount,
    },
    Claimed {
        recipient: Address,
        token: Address,
        #[serde(with = "decimal")]
        amount: Amount,
    },
}

/// Transaction signature (mock format)
pub type TransactionSignature = [u8; 64];

/// Result of a successfully applied transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub signature: TransactionSignature,
    pub transfers: Vec<Transfer>,
}

impl TxReceipt {
    /// Sum of transfers to `recipient`
    pub fn paid_to(&self, recipient: &Address) -> Amount {
        self.transfers
            .iter()
            .filter(|t| t.to == Payee::Recipient(*recipient))
            .fold(Amount::zero(), |acc, t| acc.saturating_add(t.amount))
    }
}

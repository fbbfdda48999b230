//! Distribution ledger state machine.
//!
//! All state lives in an explicit keyed store (`LedgerState`): token →
//! record and (token, recipient) → claimed counter. Each transition is a
//! method that validates every precondition before it writes anything, so
//! a failed transition leaves the state untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use merkledrop_core::{Address, Amount, DecimalAmount, Digest, StoragePointer};
use merkledrop_prover::{Committer, KeccakCommitter};

use crate::types::{
    ClaimRequest, DistributionRecord, DistributionState, LedgerEvent, Payee, Transfer, Transition,
};
use crate::{LedgerError, Result};

/// Serializable ledger contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    distributions: BTreeMap<Address, DistributionRecord>,
    claimed: BTreeMap<Address, BTreeMap<Address, DecimalAmount>>,
    events: Vec<LedgerEvent>,
}

#[derive(Clone)]
pub struct DistributionLedger {
    state: LedgerState,
    committer: Arc<dyn Committer>,
}

impl Default for DistributionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DistributionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionLedger")
            .field("distributions", &self.state.distributions.len())
            .field("events", &self.state.events.len())
            .finish()
    }
}

/// Counter values a claim will write once the whole operation succeeds.
struct StagedClaim {
    token: Address,
    recipient: Address,
    counter: Amount,
    total_claimed: Amount,
    delta: Amount,
}

impl DistributionLedger {
    /// Empty ledger verifying claims with the keccak committer
    pub fn new() -> Self {
        Self::with_committer(Arc::new(KeccakCommitter))
    }

    pub fn with_committer(committer: Arc<dyn Committer>) -> Self {
        Self {
            state: LedgerState::default(),
            committer,
        }
    }

    /// Restore a ledger from a snapshot
    pub fn from_state(state: LedgerState, committer: Arc<dyn Committer>) -> Self {
        Self { state, committer }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.state)
            .map_err(|e| LedgerError::SerializationError(e.to_string()))
    }

    pub fn from_json(bytes: &[u8], committer: Arc<dyn Committer>) -> Result<Self> {
        let state = serde_json::from_slice(bytes)
            .map_err(|e| LedgerError::SerializationError(e.to_string()))?;
        Ok(Self::from_state(state, committer))
    }

    // ==================== Queries ====================

    pub fn distribution(&self, token: &Address) -> Option<&DistributionRecord> {
        self.state.distributions.get(token)
    }

    pub fn distribution_state(&self, token: &Address) -> DistributionState {
        self.distribution(token)
            .map_or(DistributionState::Unknown, DistributionRecord::state)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Address> {
        self.state.distributions.keys()
    }

    /// Claimed-amount counter; zero when the recipient never claimed.
    pub fn claimed(&self, token: &Address, recipient: &Address) -> Amount {
        self.state
            .claimed
            .get(token)
            .and_then(|counters| counters.get(recipient))
            .map(|c| c.0)
            .unwrap_or_default()
    }

    /// Every non-zero counter for `token`
    pub fn claimed_counters(&self, token: &Address) -> Vec<(Address, Amount)> {
        self.state
            .claimed
            .get(token)
            .map(|counters| counters.iter().map(|(a, c)| (*a, c.0)).collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.state.events
    }

    // ==================== Transitions ====================

    /// Apply a prepared transition.
    pub fn apply(&mut self, transition: Transition) -> Result<Vec<Transfer>> {
        match transition {
            Transition::Add {
                token,
                root,
                storage_pointer,
                total_amount,
            } => self.add(token, root, storage_pointer, total_amount).map(|_| Vec::new()),
            Transition::Update {
                token,
                expected_root,
                root,
                storage_pointer,
                total_amount,
            } => {
                if let Some(expected) = expected_root {
                    self.check_current_root(token, expected)?;
                }
                self.update(token, root, storage_pointer, total_amount)
                    .map(|_| Vec::new())
            }
            Transition::PauseForWithdrawal { token } => {
                self.pause_for_withdrawal(token).map(|_| Vec::new())
            }
            Transition::WithdrawUnclaimed {
                token,
                root,
                storage_pointer,
                total_amount,
            } => self
                .withdraw_unclaimed_tokens(token, root, storage_pointer, total_amount)
                .map(|t| t.into_iter().collect()),
            Transition::Claim(request) => self.claim(request).map(|t| vec![t]),
            Transition::ClaimBatch {
                recipient,
                tokens,
                indices,
                amounts,
                proofs,
            } => self.claim_batch(recipient, tokens, indices, amounts, proofs),
        }
    }

    /// Create the first distribution for `token`.
    pub fn add(
        &mut self,
        token: Address,
        root: Digest,
        storage_pointer: StoragePointer,
        total_amount: Amount,
    ) -> Result<()> {
        if self.state.distributions.contains_key(&token) {
            warn!("Rejecting add for {}: already exists", token.short());
            return Err(LedgerError::AlreadyExists(token));
        }

        self.state.distributions.insert(
            token,
            DistributionRecord {
                token,
                paused: false,
                merkle_root: root,
                storage_pointer,
                total_amount,
                total_claimed: Amount::zero(),
            },
        );
        self.state.events.push(LedgerEvent::DistributionAdded {
            token,
            merkle_root: root,
            storage_pointer,
            total_amount,
        });

        info!(
            "Distribution added for {} (root: {}, total: {})",
            token.short(),
            hex::encode(&root[..8]),
            total_amount,
        );
        Ok(())
    }

    /// Replace the commitment of an active distribution.
    ///
    /// The total may only grow.
    pub fn update(
        &mut self,
        token: Address,
        root: Digest,
        storage_pointer: StoragePointer,
        total_amount: Amount,
    ) -> Result<()> {
        let record = self
            .state
            .distributions
            .get_mut(&token)
            .ok_or(LedgerError::NotFound(token))?;
        if record.paused {
            warn!("Rejecting update for {}: paused", token.short());
            return Err(LedgerError::Paused(token));
        }
        if total_amount < record.total_amount {
            warn!(
                "Rejecting update for {}: total {} < {}",
                token.short(),
                total_amount,
                record.total_amount
            );
            return Err(LedgerError::TotalDecreased {
                token,
                current: record.total_amount,
                proposed: total_amount,
            });
        }

        record.merkle_root = root;
        record.storage_pointer = storage_pointer;
        record.total_amount = total_amount;
        self.state.events.push(LedgerEvent::DistributionUpdated {
            token,
            merkle_root: root,
            storage_pointer,
            total_amount,
        });

        info!(
            "Distribution updated for {} (root: {}, total: {})",
            token.short(),
            hex::encode(&root[..8]),
            total_amount,
        );
        Ok(())
    }

    /// Freeze claims so the withdrawal can read stable counters.
    pub fn pause_for_withdrawal(&mut self, token: Address) -> Result<()> {
        let record = self
            .state
            .distributions
            .get_mut(&token)
            .ok_or(LedgerError::NotFound(token))?;
        if record.paused {
            return Err(LedgerError::AlreadyPaused(token));
        }

        record.paused = true;
        self.state
            .events
            .push(LedgerEvent::DistributionPaused { token });

        info!("Distribution paused for {}", token.short());
        Ok(())
    }

    /// Replace a paused distribution's commitment with one restricted to
    /// already-claimed amounts and release the unclaimed remainder.
    ///
    /// `total_amount` must equal the sum of the token's claimed counters.
    /// Returns the treasury transfer, if anything was unclaimed.
    pub fn withdraw_unclaimed_tokens(
        &mut self,
        token: Address,
        root: Digest,
        storage_pointer: StoragePointer,
        total_amount: Amount,
    ) -> Result<Option<Transfer>> {
        let record = self
            .state
            .distributions
            .get(&token)
            .ok_or(LedgerError::NotFound(token))?;
        if !record.paused {
            return Err(LedgerError::NotPaused(token));
        }

        let claimed = self.claimed_total(&token)?;
        if total_amount != claimed {
            warn!(
                "Rejecting withdrawal for {}: claimed {}, submitted {}",
                token.short(),
                claimed,
                total_amount
            );
            return Err(LedgerError::AccountingMismatch {
                token,
                claimed,
                submitted: total_amount,
            });
        }
        let withdrawn = record
            .total_amount
            .checked_sub(claimed)
            .ok_or(LedgerError::AmountOverflow)?;

        let record = self
            .state
            .distributions
            .get_mut(&token)
            .ok_or(LedgerError::NotFound(token))?;
        record.paused = false;
        record.merkle_root = root;
        record.storage_pointer = storage_pointer;
        record.total_amount = total_amount;
        record.total_claimed = claimed;

        self.state.events.push(LedgerEvent::UnclaimedWithdrawn {
            token,
            merkle_root: root,
            storage_pointer,
            total_amount,
            withdrawn,
        });

        info!(
            "Unclaimed tokens withdrawn for {} ({} to treasury, {} remains claimed)",
            token.short(),
            withdrawn,
            total_amount,
        );

        Ok((!withdrawn.is_zero()).then_some(Transfer {
            token,
            to: Payee::Treasury,
            amount: withdrawn,
        }))
    }

    /// Claim the increment of `request.amount` over the recipient's counter.
    pub fn claim(&mut self, request: ClaimRequest) -> Result<Transfer> {
        let counter = self.claimed(&request.token, &request.recipient);
        let total_claimed = self
            .distribution(&request.token)
            .map(|r| r.total_claimed)
            .unwrap_or_default();
        let staged = self.check_claim(&request, counter, total_claimed)?;
        Ok(self.commit_claim(staged))
    }

    /// Claim on several tokens for one recipient, all-or-nothing.
    pub fn claim_batch(
        &mut self,
        recipient: Address,
        tokens: Vec<Address>,
        indices: Vec<u64>,
        amounts: Vec<Amount>,
        proofs: Vec<Vec<Digest>>,
    ) -> Result<Vec<Transfer>> {
        let n = tokens.len();
        if indices.len() != n || amounts.len() != n || proofs.len() != n {
            return Err(LedgerError::LengthMismatch);
        }

        // token -> (counter, total_claimed) as they will be after the claims
        // staged so far
        let mut overlay: HashMap<Address, (Amount, Amount)> = HashMap::new();
        let mut staged = Vec::with_capacity(n);

        let requests = tokens
            .into_iter()
            .zip(indices)
            .zip(amounts)
            .zip(proofs)
            .map(|(((token, index), amount), proof)| ClaimRequest {
                token,
                index,
                recipient,
                amount,
                proof,
            });

        for request in requests {
            let (counter, total_claimed) = match overlay.get(&request.token) {
                Some(&values) => values,
                None => (
                    self.claimed(&request.token, &recipient),
                    self.distribution(&request.token)
                        .map(|r| r.total_claimed)
                        .unwrap_or_default(),
                ),
            };
            let claim = self.check_claim(&request, counter, total_claimed)?;
            overlay.insert(claim.token, (claim.counter, claim.total_claimed));
            staged.push(claim);
        }

        Ok(staged
            .into_iter()
            .map(|claim| self.commit_claim(claim))
            .collect())
    }

    /// Validate a claim against explicit prior counter values.
    fn check_claim(
        &self,
        request: &ClaimRequest,
        counter: Amount,
        total_claimed: Amount,
    ) -> Result<StagedClaim> {
        let token = request.token;
        let recipient = request.recipient;
        let record = self
            .distribution(&token)
            .ok_or(LedgerError::NotFound(token))?;
        if record.paused {
            return Err(LedgerError::Paused(token));
        }

        if !self.committer.verify(
            &record.merkle_root,
            request.index,
            &recipient,
            &request.amount,
            &request.proof,
        ) {
            debug!(
                "Invalid proof from {} on {} (index {})",
                recipient.short(),
                token.short(),
                request.index
            );
            return Err(LedgerError::InvalidProof { token, recipient });
        }

        if request.amount <= counter {
            return Err(LedgerError::NothingToClaim { token, recipient });
        }
        let delta = request.amount - counter;

        let remaining = record.total_amount.saturating_sub(total_claimed);
        if delta > remaining {
            return Err(LedgerError::ExceedsDistribution {
                token,
                requested: delta,
                remaining,
            });
        }

        Ok(StagedClaim {
            token,
            recipient,
            counter: request.amount,
            total_claimed: total_claimed + delta,
            delta,
        })
    }

    fn commit_claim(&mut self, claim: StagedClaim) -> Transfer {
        self.state
            .claimed
            .entry(claim.token)
            .or_default()
            .insert(claim.recipient, DecimalAmount(claim.counter));
        if let Some(record) = self.state.distributions.get_mut(&claim.token) {
            record.total_claimed = claim.total_claimed;
        }
        self.state.events.push(LedgerEvent::Claimed {
            recipient: claim.recipient,
            token: claim.token,
            amount: claim.delta,
        });

        info!(
            "{} claimed {} on {} (cumulative {})",
            claim.recipient.short(),
            claim.delta,
            claim.token.short(),
            claim.counter,
        );

        Transfer {
            token: claim.token,
            to: Payee::Recipient(claim.recipient),
            amount: claim.delta,
        }
    }

    fn check_current_root(&self, token: Address, expected: Digest) -> Result<()> {
        let current = self
            .distribution(&token)
            .ok_or(LedgerError::NotFound(token))?
            .merkle_root;
        if current != expected {
            warn!(
                "Rejecting update for {}: built on {}, ledger at {}",
                token.short(),
                hex::encode(&expected[..8]),
                hex::encode(&current[..8]),
            );
            return Err(LedgerError::StaleRoot {
                token,
                expected,
                current,
            });
        }
        Ok(())
    }

    /// Sum of the claimed counters for `token`, recomputed from the counters.
    fn claimed_total(&self, token: &Address) -> Result<Amount> {
        let counters = self.claimed_counters(token);
        Ok(merkledrop_core::checked_sum(counters.iter().map(|(_, c)| c))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merkledrop_prover::MerkleTree;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn token() -> Address {
        addr(0xEE)
    }

    fn two_account_tree(a: u64, b: u64) -> (MerkleTree, Vec<(Address, Amount)>) {
        let leaves = vec![(addr(1), Amount::from(a)), (addr(2), Amount::from(b))];
        (MerkleTree::from_entries(&leaves), leaves)
    }

    fn claim_req(
        tree: &MerkleTree,
        token: Address,
        index: usize,
        who: Address,
        amount: u64,
    ) -> ClaimRequest {
        ClaimRequest {
            token,
            index: index as u64,
            recipient: who,
            amount: Amount::from(amount),
            proof: tree.proof(index).unwrap().siblings,
        }
    }

    fn ledger_with_distribution() -> (DistributionLedger, MerkleTree) {
        let (tree, _) = two_account_tree(100, 101);
        let mut ledger = DistributionLedger::new();
        ledger
            .add(token(), tree.root(), StoragePointer::ZERO, Amount::from(201u64))
            .unwrap();
        (ledger, tree)
    }

    #[test]
    fn test_add_creates_active_record() {
        let (ledger, tree) = ledger_with_distribution();
        let record = ledger.distribution(&token()).unwrap();
        assert_eq!(record.merkle_root, tree.root());
        assert_eq!(record.total_amount, Amount::from(201u64));
        assert_eq!(ledger.distribution_state(&token()), DistributionState::Active);
        assert_eq!(ledger.distribution_state(&addr(0x77)), DistributionState::Unknown);
    }

    #[test]
    fn test_update_built_on_old_root_is_stale() {
        let (mut ledger, tree) = ledger_with_distribution();
        let (first, _) = two_account_tree(150, 101);
        let (second, _) = two_account_tree(100, 160);
        let update = |expected_root, root| Transition::Update {
            token: token(),
            expected_root,
            root,
            storage_pointer: StoragePointer::ZERO,
            total_amount: Amount::from(260u64),
        };

        // two updates prepared from the same base: the second must not
        // silently replace the first
        ledger.apply(update(Some(tree.root()), first.root())).unwrap();
        let before = ledger.clone();
        let result = ledger.apply(update(Some(tree.root()), second.root()));
        assert_eq!(
            result,
            Err(LedgerError::StaleRoot {
                token: token(),
                expected: tree.root(),
                current: first.root(),
            })
        );
        assert_eq!(ledger.distribution(&token()), before.distribution(&token()));
        assert_eq!(ledger.events().len(), before.events().len());

        ledger.apply(update(Some(first.root()), second.root())).unwrap();
        ledger.apply(update(None, tree.root())).unwrap();
        assert_eq!(
            ledger.distribution(&token()).unwrap().merkle_root,
            tree.root()
        );
    }

    #[test]
    fn test_add_twice_fails() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.add(token(), tree.root(), StoragePointer::ZERO, Amount::one());
        assert!(matches!(result, Err(LedgerError::AlreadyExists(_))));
    }

    #[test]
    fn test_claim_with_empty_proof_fails() {
        let mut ledger = DistributionLedger::new();
        ledger
            .add(token(), [0u8; 32], StoragePointer::ZERO, Amount::zero())
            .unwrap();
        let result = ledger.claim(ClaimRequest {
            token: token(),
            index: 0,
            recipient: addr(1),
            amount: Amount::from(10u64),
            proof: vec![],
        });
        assert!(matches!(result, Err(LedgerError::InvalidProof { .. })));
    }

    #[test]
    fn test_successful_claims_transfer_and_increment() {
        let (mut ledger, tree) = ledger_with_distribution();

        let t0 = ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)).unwrap();
        assert_eq!(t0.to, Payee::Recipient(addr(1)));
        assert_eq!(t0.amount, Amount::from(100u64));
        assert_eq!(ledger.claimed(&token(), &addr(1)), Amount::from(100u64));
        assert_eq!(ledger.claimed(&token(), &addr(2)), Amount::zero());

        let t1 = ledger.claim(claim_req(&tree, token(), 1, addr(2), 101)).unwrap();
        assert_eq!(t1.amount, Amount::from(101u64));
        assert_eq!(
            ledger.distribution(&token()).unwrap().total_claimed,
            Amount::from(201u64)
        );
    }

    #[test]
    fn test_cannot_claim_twice() {
        let (mut ledger, tree) = ledger_with_distribution();
        ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)).unwrap();
        let again = ledger.claim(claim_req(&tree, token(), 0, addr(1), 100));
        assert!(matches!(again, Err(LedgerError::NothingToClaim { .. })));
    }

    #[test]
    fn test_cannot_claim_for_other_address() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.claim(claim_req(&tree, token(), 0, addr(2), 101));
        assert!(matches!(result, Err(LedgerError::InvalidProof { .. })));
    }

    #[test]
    fn test_cannot_claim_more_than_proof() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.claim(claim_req(&tree, token(), 0, addr(1), 101));
        assert!(matches!(result, Err(LedgerError::InvalidProof { .. })));
    }

    #[test]
    fn test_claim_with_substituted_index_fails() {
        let (mut ledger, tree) = ledger_with_distribution();
        let mut request = claim_req(&tree, token(), 0, addr(1), 100);
        request.index = 1;
        assert!(matches!(
            ledger.claim(request),
            Err(LedgerError::InvalidProof { .. })
        ));
    }

    #[test]
    fn test_claim_unknown_distribution() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.claim(claim_req(&tree, addr(0x55), 0, addr(1), 100));
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_update_then_reclaim_increment() {
        let (mut ledger, tree) = ledger_with_distribution();
        ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)).unwrap();

        let (new_tree, _) = two_account_tree(200, 201);
        ledger
            .update(token(), new_tree.root(), StoragePointer([1u8; 32]), Amount::from(401u64))
            .unwrap();

        let t = ledger.claim(claim_req(&new_tree, token(), 0, addr(1), 200)).unwrap();
        assert_eq!(t.amount, Amount::from(100u64));
        let t = ledger.claim(claim_req(&new_tree, token(), 1, addr(2), 201)).unwrap();
        assert_eq!(t.amount, Amount::from(201u64));
        assert_eq!(ledger.claimed(&token(), &addr(1)), Amount::from(200u64));
    }

    #[test]
    fn test_update_unknown_distribution() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.update(
            addr(2),
            tree.root(),
            StoragePointer::ZERO,
            Amount::from(201u64),
        );
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_update_cannot_decrease_total() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.update(
            token(),
            tree.root(),
            StoragePointer::ZERO,
            Amount::from(200u64),
        );
        assert!(matches!(result, Err(LedgerError::TotalDecreased { .. })));
        assert_eq!(
            ledger.distribution(&token()).unwrap().total_amount,
            Amount::from(201u64)
        );
    }

    #[test]
    fn test_pause_blocks_claims_and_updates() {
        let (mut ledger, tree) = ledger_with_distribution();
        ledger.pause_for_withdrawal(token()).unwrap();
        assert!(ledger.distribution(&token()).unwrap().paused);

        assert!(matches!(
            ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)),
            Err(LedgerError::Paused(_))
        ));
        assert!(matches!(
            ledger.update(token(), tree.root(), StoragePointer::ZERO, Amount::from(300u64)),
            Err(LedgerError::Paused(_))
        ));
        assert!(matches!(
            ledger.pause_for_withdrawal(token()),
            Err(LedgerError::AlreadyPaused(_))
        ));
    }

    #[test]
    fn test_withdraw_requires_pause() {
        let (mut ledger, tree) = ledger_with_distribution();
        let result = ledger.withdraw_unclaimed_tokens(
            token(),
            tree.root(),
            StoragePointer::ZERO,
            Amount::zero(),
        );
        assert!(matches!(result, Err(LedgerError::NotPaused(_))));
    }

    #[test]
    fn test_withdraw_unclaimed_tokens() {
        let (mut ledger, tree) = ledger_with_distribution();
        ledger.claim(claim_req(&tree, token(), 1, addr(2), 101)).unwrap();
        ledger.pause_for_withdrawal(token()).unwrap();

        let transfer = ledger
            .withdraw_unclaimed_tokens(
                token(),
                tree.root(),
                StoragePointer::ZERO,
                Amount::from(101u64),
            )
            .unwrap()
            .unwrap();
        assert_eq!(transfer.to, Payee::Treasury);
        assert_eq!(transfer.amount, Amount::from(100u64));

        let record = ledger.distribution(&token()).unwrap();
        assert!(!record.paused);
        assert_eq!(record.total_amount, Amount::from(101u64));
        assert_eq!(record.unclaimed(), Amount::zero());
    }

    #[test]
    fn test_withdraw_accounting_mismatch_leaves_state() {
        let (mut ledger, tree) = ledger_with_distribution();
        ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)).unwrap();
        ledger.pause_for_withdrawal(token()).unwrap();

        let result = ledger.withdraw_unclaimed_tokens(
            token(),
            [9u8; 32],
            StoragePointer::ZERO,
            Amount::from(101u64),
        );
        assert!(matches!(result, Err(LedgerError::AccountingMismatch { .. })));
        let record = ledger.distribution(&token()).unwrap();
        assert!(record.paused);
        assert_eq!(record.merkle_root, tree.root());
    }

    #[test]
    fn test_claim_batch() {
        let (tree, _) = two_account_tree(100, 101);
        let mut ledger = DistributionLedger::new();
        for t in [addr(0xA1), addr(0xA3)] {
            ledger.add(t, tree.root(), StoragePointer::ZERO, Amount::from(201u64)).unwrap();
        }
        let proof = tree.proof(0).unwrap().siblings;

        let transfers = ledger
            .claim_batch(
                addr(1),
                vec![addr(0xA1), addr(0xA3)],
                vec![0, 0],
                vec![Amount::from(100u64), Amount::from(100u64)],
                vec![proof.clone(), proof],
            )
            .unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(ledger.claimed(&addr(0xA1), &addr(1)), Amount::from(100u64));
        assert_eq!(ledger.claimed(&addr(0xA3), &addr(1)), Amount::from(100u64));
    }

    #[test]
    fn test_claim_batch_length_mismatch() {
        let (mut ledger, _) = ledger_with_distribution();
        let result = ledger.claim_batch(
            addr(1),
            vec![token()],
            vec![0, 1],
            vec![Amount::one()],
            vec![vec![]],
        );
        assert!(matches!(result, Err(LedgerError::LengthMismatch)));
    }

    #[test]
    fn test_claim_batch_is_atomic() {
        let (tree, _) = two_account_tree(100, 101);
        let mut ledger = DistributionLedger::new();
        for t in [addr(0xA1), addr(0xA2)] {
            ledger.add(t, tree.root(), StoragePointer::ZERO, Amount::from(201u64)).unwrap();
        }
        let good = tree.proof(0).unwrap().siblings;
        let mut bad = good.clone();
        bad[0][0] ^= 0xFF;
        let events_before = ledger.events().len();

        let result = ledger.claim_batch(
            addr(1),
            vec![addr(0xA1), addr(0xA2)],
            vec![0, 0],
            vec![Amount::from(100u64), Amount::from(100u64)],
            vec![good, bad],
        );
        assert!(matches!(result, Err(LedgerError::InvalidProof { .. })));
        assert_eq!(ledger.claimed(&addr(0xA1), &addr(1)), Amount::zero());
        assert_eq!(ledger.events().len(), events_before);
    }

    #[test]
    fn test_claim_batch_same_token_twice_sees_first_claim() {
        let (mut ledger, tree) = ledger_with_distribution();
        let proof = tree.proof(0).unwrap().siblings;
        let result = ledger.claim_batch(
            addr(1),
            vec![token(), token()],
            vec![0, 0],
            vec![Amount::from(100u64), Amount::from(100u64)],
            vec![proof.clone(), proof],
        );
        assert!(matches!(result, Err(LedgerError::NothingToClaim { .. })));
        assert_eq!(ledger.claimed(&token(), &addr(1)), Amount::zero());
    }

    #[test]
    fn test_claim_cannot_exceed_total() {
        let (tree, _) = two_account_tree(100, 101);
        let mut ledger = DistributionLedger::new();
        // Root commits to 201 but the record only funds 150
        ledger
            .add(token(), tree.root(), StoragePointer::ZERO, Amount::from(150u64))
            .unwrap();
        ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)).unwrap();
        let result = ledger.claim(claim_req(&tree, token(), 1, addr(2), 101));
        assert!(matches!(result, Err(LedgerError::ExceedsDistribution { .. })));
    }

    #[test]
    fn test_events_and_snapshot_round_trip() {
        let (mut ledger, tree) = ledger_with_distribution();
        ledger.claim(claim_req(&tree, token(), 0, addr(1), 100)).unwrap();
        ledger.pause_for_withdrawal(token()).unwrap();

        assert!(matches!(ledger.events()[0], LedgerEvent::DistributionAdded { .. }));
        assert!(matches!(ledger.events()[1], LedgerEvent::Claimed { .. }));
        assert!(matches!(ledger.events()[2], LedgerEvent::DistributionPaused { .. }));

        let bytes = ledger.to_json().unwrap();
        let restored = DistributionLedger::from_json(&bytes, Arc::new(KeccakCommitter)).unwrap();
        assert_eq!(restored.state(), ledger.state());
        assert_eq!(restored.claimed(&token(), &addr(1)), Amount::from(100u64));
    }

    #[test]
    fn test_apply_dispatches() {
        let (tree, _) = two_account_tree(100, 101);
        let mut ledger = DistributionLedger::new();
        ledger
            .apply(Transition::Add {
                token: token(),
                root: tree.root(),
                storage_pointer: StoragePointer::ZERO,
                total_amount: Amount::from(201u64),
            })
            .unwrap();
        let transfers = ledger
            .apply(Transition::Claim(claim_req(&tree, token(), 0, addr(1), 100)))
            .unwrap();
        assert_eq!(transfers.len(), 1);
        ledger.apply(Transition::PauseForWithdrawal { token: token() }).unwrap();
        let transfers = ledger
            .apply(Transition::WithdrawUnclaimed {
                token: token(),
                root: MerkleTree::from_entries(&[(addr(1), Amount::from(100u64))]).root(),
                storage_pointer: StoragePointer::ZERO,
                total_amount: Amount::from(100u64),
            })
            .unwrap();
        assert_eq!(transfers[0].amount, Amount::from(101u64));
    }
}

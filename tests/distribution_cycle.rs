//! Distribution cycle integration tests
//!
//! Drives the full off-chain pipeline against a local ledger:
//! 1. First distribution and claims
//! 2. Additive update and incremental re-claim
//! 3. Proof soundness at the ledger
//! 4. Rejected transitions leave no trace
//! 5. File-backed store and ledger across restarts

use std::sync::Arc;

use merkledrop_aggregator::{
    allocate, AggregatorError, AllocationConfig, AllocationOutcome, BalanceSource, Commitment,
    Distributor,
};
use merkledrop_core::{Address, Amount, BalanceMap, DatasetEntry, DistributionDataset};
use merkledrop_prover::KeccakCommitter;
use merkledrop_settlement::{
    ClaimRequest, DistributionState, LedgerClient, LedgerError, LedgerEvent, LocalLedgerClient,
    Transition,
};
use merkledrop_store::{DatasetStore, FileStore, MemoryStore, StoreError};

const TOKEN: Address = Address([0xEE; 20]);
const A: Address = Address([0xA1; 20]);
const B: Address = Address([0xB2; 20]);

fn delta(pairs: &[(Address, u64)]) -> AllocationOutcome {
    AllocationOutcome::from_balances(
        BalanceMap::from_pairs(pairs.iter().map(|(a, n)| (*a, Amount::from(*n)))).unwrap(),
    )
}

fn setup() -> (Arc<MemoryStore>, Arc<LocalLedgerClient>, Distributor) {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(LocalLedgerClient::in_memory());
    let distributor = Distributor::new(store.clone(), ledger.clone());
    (store, ledger, distributor)
}

async fn claim(
    distributor: &Distributor,
    ledger: &LocalLedgerClient,
    recipient: Address,
) -> Result<Amount, LedgerError> {
    let bundle = distributor.claim_bundle(&TOKEN, &recipient).await.unwrap();
    let receipt = ledger
        .submit(Transition::Claim(ClaimRequest {
            token: TOKEN,
            index: bundle.index,
            recipient,
            amount: bundle.amount,
            proof: bundle.proof,
        }))
        .await?;
    Ok(receipt.paid_to(&recipient))
}

// ============================================================================
// 1-2. End-to-end scenario
// ============================================================================

#[tokio::test]
async fn test_add_claim_update_reclaim() {
    let (_store, ledger, distributor) = setup();

    let published = distributor
        .distribute(TOKEN, &delta(&[(A, 100), (B, 101)]))
        .await
        .unwrap();
    assert_eq!(published.total_amount, Amount::from(201u64));

    let record = ledger.distribution(&TOKEN).await.unwrap().unwrap();
    assert_eq!(record.merkle_root, published.root);
    assert_eq!(record.storage_pointer, published.storage_pointer);
    assert_eq!(record.state(), DistributionState::Active);

    let bundle = distributor.claim_bundle(&TOKEN, &A).await.unwrap();
    assert_eq!(bundle.index, 0);
    assert_eq!(bundle.amount, Amount::from(100u64));

    assert_eq!(claim(&distributor, &ledger, A).await.unwrap(), Amount::from(100u64));
    assert_eq!(ledger.claimed(&TOKEN, &A).await.unwrap(), Amount::from(100u64));

    let updated = distributor.distribute(TOKEN, &delta(&[(A, 50)])).await.unwrap();
    assert_eq!(updated.total_amount, Amount::from(251u64));
    assert_ne!(updated.root, published.root);

    let dataset = distributor.current_commitment(&TOKEN).await.unwrap().into_dataset();
    assert_eq!(dataset.amount_of(&A), Amount::from(150u64));
    assert_eq!(dataset.amount_of(&B), Amount::from(101u64));
    assert_eq!(dataset.get(&A).unwrap().index, 0);
    assert_eq!(dataset.get(&B).unwrap().index, 1);

    assert_eq!(claim(&distributor, &ledger, A).await.unwrap(), Amount::from(50u64));
    assert_eq!(ledger.claimed(&TOKEN, &A).await.unwrap(), Amount::from(150u64));
}

#[tokio::test]
async fn test_new_recipient_in_update_is_appended() {
    let (_store, _ledger, distributor) = setup();
    let c = Address([0xC3; 20]);

    distributor
        .distribute(TOKEN, &delta(&[(A, 100), (B, 101)]))
        .await
        .unwrap();
    distributor
        .distribute(TOKEN, &delta(&[(c, 7), (B, 1)]))
        .await
        .unwrap();

    let dataset = distributor.current_commitment(&TOKEN).await.unwrap().into_dataset();
    let order: Vec<_> = dataset.entries().iter().map(|e| (e.address, e.index)).collect();
    assert_eq!(order, vec![(A, 0), (B, 1), (c, 2)]);
    assert_eq!(dataset.total_amount, Amount::from(209u64));
}

#[tokio::test]
async fn test_claim_twice_pays_once() {
    let (_store, ledger, distributor) = setup();
    distributor
        .distribute(TOKEN, &delta(&[(A, 100), (B, 101)]))
        .await
        .unwrap();

    assert_eq!(claim(&distributor, &ledger, B).await.unwrap(), Amount::from(101u64));
    assert!(matches!(
        claim(&distributor, &ledger, B).await,
        Err(LedgerError::NothingToClaim { recipient, .. }) if recipient == B
    ));

    let paid: Amount = ledger
        .events()
        .await
        .iter()
        .filter_map(|e| match e {
            LedgerEvent::Claimed { recipient, amount, .. } if *recipient == B => Some(*amount),
            _ => None,
        })
        .fold(Amount::zero(), |acc, a| acc + a);
    assert_eq!(paid, Amount::from(101u64));
}

#[tokio::test]
async fn test_allocation_feeds_distribution() {
    let (_store, _ledger, distributor) = setup();

    let sdl = BalanceSource::raw(
        "sdl",
        BalanceMap::from_pairs([(A, Amount::from(30u64))]).unwrap(),
    );
    let reward = BalanceSource::raw(
        "reward",
        BalanceMap::from_pairs([(A, Amount::from(70u64)), (B, Amount::from(5u64))]).unwrap(),
    );
    let outcome = allocate(&[sdl, reward], &AllocationConfig::default()).unwrap();
    distributor.distribute(TOKEN, &outcome).await.unwrap();

    let dataset = distributor.current_commitment(&TOKEN).await.unwrap().into_dataset();
    let a = dataset.get(&A).unwrap();
    assert_eq!(a.amount, Amount::from(100u64));
    assert_eq!(a.breakdown["sdl"], Amount::from(30u64));
    assert_eq!(a.breakdown["reward"], Amount::from(70u64));
}

// ============================================================================
// 3. Proof soundness
// ============================================================================

#[tokio::test]
async fn test_tampered_proofs_are_rejected() {
    let (_store, ledger, distributor) = setup();
    distributor
        .distribute(TOKEN, &delta(&[(A, 100), (B, 101), (Address([3; 20]), 5)]))
        .await
        .unwrap();
    let bundle = distributor.claim_bundle(&TOKEN, &A).await.unwrap();

    for sibling in 0..bundle.proof.len() {
        for byte in [0usize, 17, 31] {
            let mut proof = bundle.proof.clone();
            proof[sibling][byte] ^= 0x01;
            let result = ledger
                .submit(Transition::Claim(ClaimRequest {
                    token: TOKEN,
                    index: bundle.index,
                    recipient: A,
                    amount: bundle.amount,
                    proof,
                }))
                .await;
            assert!(matches!(result, Err(LedgerError::InvalidProof { .. })));
        }
    }

    let other = distributor.claim_bundle(&TOKEN, &B).await.unwrap();
    let result = ledger
        .submit(Transition::Claim(ClaimRequest {
            token: TOKEN,
            index: other.index,
            recipient: A,
            amount: bundle.amount,
            proof: bundle.proof.clone(),
        }))
        .await;
    assert!(matches!(result, Err(LedgerError::InvalidProof { .. })));

    let inflated = ledger
        .submit(Transition::Claim(ClaimRequest {
            token: TOKEN,
            index: bundle.index,
            recipient: A,
            amount: bundle.amount + Amount::from(1u64),
            proof: bundle.proof,
        }))
        .await;
    assert!(matches!(inflated, Err(LedgerError::InvalidProof { .. })));
    assert_eq!(ledger.claimed(&TOKEN, &A).await.unwrap(), Amount::zero());
}

// ============================================================================
// 4. Rejections without side effects
// ============================================================================

#[tokio::test]
async fn test_decreasing_update_is_rejected_before_publication() {
    let (store, ledger, distributor) = setup();
    distributor
        .distribute(TOKEN, &delta(&[(A, 100), (B, 101)]))
        .await
        .unwrap();
    let before = ledger.distribution(&TOKEN).await.unwrap();
    let stored = store.len().await;

    let mut prepared = distributor.prepare_update(TOKEN, &delta(&[(B, 1)])).await.unwrap();
    prepared.commitment = Commitment::build(
        &KeccakCommitter,
        Some(TOKEN),
        vec![
            DatasetEntry::new(A, 0, Amount::from(90u64)),
            DatasetEntry::new(B, 1, Amount::from(112u64)),
        ],
    )
    .unwrap();

    let result = distributor.publish(prepared).await;
    assert!(matches!(
        result,
        Err(AggregatorError::Monotonicity { recipient, .. }) if recipient == A
    ));
    assert_eq!(ledger.distribution(&TOKEN).await.unwrap(), before);
    assert_eq!(store.len().await, stored);
}

#[tokio::test]
async fn test_stale_preparation_is_rejected() {
    let (_store, _ledger, distributor) = setup();
    distributor.distribute(TOKEN, &delta(&[(A, 100)])).await.unwrap();

    let stale = distributor.prepare_update(TOKEN, &delta(&[(A, 1)])).await.unwrap();
    distributor.distribute(TOKEN, &delta(&[(B, 5)])).await.unwrap();

    assert!(matches!(
        distributor.publish(stale).await,
        Err(AggregatorError::RootMismatch { .. })
    ));
}

#[tokio::test]
async fn test_ledger_pointing_at_wrong_dataset() {
    let (store, ledger, distributor) = setup();

    let real = Commitment::build(
        &KeccakCommitter,
        Some(TOKEN),
        vec![DatasetEntry::new(A, 0, Amount::from(100u64))],
    )
    .unwrap();
    let decoy = Commitment::build(
        &KeccakCommitter,
        Some(TOKEN),
        vec![DatasetEntry::new(A, 0, Amount::from(1000u64))],
    )
    .unwrap();
    let decoy_pointer = store.put(decoy.dataset()).await.unwrap();

    ledger
        .submit(Transition::Add {
            token: TOKEN,
            root: real.root(),
            storage_pointer: decoy_pointer,
            total_amount: real.total(),
        })
        .await
        .unwrap();

    assert!(matches!(
        distributor.distribute(TOKEN, &delta(&[(B, 1)])).await,
        Err(AggregatorError::RootMismatch { .. })
    ));
    assert!(matches!(
        distributor.claim_bundle(&TOKEN, &A).await,
        Err(AggregatorError::RootMismatch { .. })
    ));
}

#[tokio::test]
async fn test_update_refused_while_paused() {
    let (_store, ledger, distributor) = setup();
    distributor.distribute(TOKEN, &delta(&[(A, 100)])).await.unwrap();
    ledger
        .submit(Transition::PauseForWithdrawal { token: TOKEN })
        .await
        .unwrap();

    assert!(matches!(
        distributor.distribute(TOKEN, &delta(&[(A, 1)])).await,
        Err(AggregatorError::Ledger(LedgerError::Paused(t))) if t == TOKEN
    ));
}

#[tokio::test]
async fn test_unknown_recipient_has_no_bundle() {
    let (_store, _ledger, distributor) = setup();
    distributor.distribute(TOKEN, &delta(&[(A, 100)])).await.unwrap();
    assert!(matches!(
        distributor.claim_bundle(&TOKEN, &B).await,
        Err(AggregatorError::UnknownRecipient(r)) if r == B
    ));
}

// ============================================================================
// 5. File-backed components
// ============================================================================

#[tokio::test]
async fn test_file_backed_cycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("datasets");
    let ledger_path = dir.path().join("ledger.json");

    let first_root = {
        let store = Arc::new(FileStore::new(&store_dir));
        let ledger = Arc::new(LocalLedgerClient::open(&ledger_path).await.unwrap());
        let distributor = Distributor::new(store, ledger.clone());
        let published = distributor
            .distribute(TOKEN, &delta(&[(A, 100), (B, 101)]))
            .await
            .unwrap();
        claim(&distributor, &ledger, A).await.unwrap();
        published.root
    };

    let store = Arc::new(FileStore::new(&store_dir));
    let ledger = Arc::new(LocalLedgerClient::open(&ledger_path).await.unwrap());
    let distributor = Distributor::new(store.clone(), ledger.clone());

    assert_eq!(ledger.claimed(&TOKEN, &A).await.unwrap(), Amount::from(100u64));
    distributor.distribute(TOKEN, &delta(&[(A, 50)])).await.unwrap();
    assert_eq!(claim(&distributor, &ledger, A).await.unwrap(), Amount::from(50u64));

    // historic datasets remain retrievable
    let first_pointer = match &ledger.events().await[0] {
        LedgerEvent::DistributionAdded { storage_pointer, merkle_root, .. } => {
            assert_eq!(*merkle_root, first_root);
            *storage_pointer
        }
        other => panic!("unexpected first event {other:?}"),
    };
    let first: DistributionDataset = store.get(first_pointer).await.unwrap();
    assert_eq!(first.amount_of(&A), Amount::from(100u64));
}

#[tokio::test]
async fn test_corrupted_file_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    let ledger = Arc::new(LocalLedgerClient::in_memory());
    let distributor = Distributor::new(store.clone(), ledger.clone());

    let published = distributor.distribute(TOKEN, &delta(&[(A, 100)])).await.unwrap();
    let path = store.path_for(&published.storage_pointer);
    let tampered = std::fs::read_to_string(&path).unwrap().replace("\"100\"", "\"999\"");
    std::fs::write(&path, tampered).unwrap();

    assert!(matches!(
        distributor.distribute(TOKEN, &delta(&[(A, 1)])).await,
        Err(AggregatorError::Store(StoreError::ContentMismatch { .. }))
    ));
}

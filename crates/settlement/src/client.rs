//! Ledger submission interface and the local persisted implementation.
//!
//! Callers hand the ledger a prepared `Transition`; it either commits in
//! full or fails with no effect. Nothing here retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use merkledrop_core::{Address, Amount};
use merkledrop_prover::{Committer, KeccakCommitter};

use crate::ledger::DistributionLedger;
use crate::types::{DistributionRecord, LedgerEvent, TransactionSignature, Transition, TxReceipt};
use crate::{LedgerError, Result};

/// Ledger transaction submitter and read access to ledger state
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Durably apply a transition.
    async fn submit(&self, transition: Transition) -> Result<TxReceipt>;

    async fn distribution(&self, token: &Address) -> Result<Option<DistributionRecord>>;

    async fn claimed(&self, token: &Address, recipient: &Address) -> Result<Amount>;

    /// Claimed counters for several recipients, in input order.
    async fn claimed_batch(&self, token: &Address, recipients: &[Address]) -> Result<Vec<Amount>> {
        let mut out = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            out.push(self.claimed(token, recipient).await?);
        }
        Ok(out)
    }
}

struct LocalState {
    ledger: DistributionLedger,
    /// Transaction counter for generating signatures
    tx_counter: u64,
}

/// In-process ledger, optionally persisted to a JSON snapshot.
///
/// Transitions are serialized by a write lock. Each one is applied to a
/// copy of the ledger, persisted, and only then swapped in. The snapshot is
/// rewritten in full on every transition and the event log is kept whole,
/// so both grow with the ledger's history.
pub struct LocalLedgerClient {
    state: Arc<RwLock<LocalState>>,
    persist_path: Option<PathBuf>,
}

impl LocalLedgerClient {
    /// Non-persistent ledger
    pub fn in_memory() -> Self {
        Self::from_ledger(DistributionLedger::new(), None)
    }

    pub fn from_ledger(ledger: DistributionLedger, persist_path: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(RwLock::new(LocalState {
                ledger,
                tx_counter: 0,
            })),
            persist_path,
        }
    }

    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_committer(path, Arc::new(KeccakCommitter)).await
    }

    pub async fn open_with_committer(
        path: impl AsRef<Path>,
        committer: Arc<dyn Committer>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let ledger = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let ledger = DistributionLedger::from_json(&bytes, committer)?;
                info!(
                    "Loaded ledger snapshot from {} ({} distributions)",
                    path.display(),
                    ledger.tokens().count()
                );
                ledger
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ledger snapshot at {}, starting empty", path.display());
                DistributionLedger::with_committer(committer)
            }
            Err(e) => {
                return Err(LedgerError::SerializationError(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self::from_ledger(ledger, Some(path.to_path_buf())))
    }

    /// Copy of the current ledger
    pub async fn snapshot(&self) -> DistributionLedger {
        self.state.read().await.ledger.clone()
    }

    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.state.read().await.ledger.events().to_vec()
    }

    /// Generate signature (when already holding lock)
    fn generate_signature(state: &mut LocalState) -> TransactionSignature {
        state.tx_counter += 1;
        let mut sig = [0u8; 64];
        sig[0..8].copy_from_slice(&state.tx_counter.to_le_bytes());
        sig[8..16].copy_from_slice(b"localtx!");
        sig
    }

    async fn persist(&self, ledger: &DistributionLedger) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let bytes = ledger.to_json()?;
        let write = async {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, path).await
        };
        write.await.map_err(|e: std::io::Error| {
            LedgerError::SubmissionFailed(format!("persist {}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl LedgerClient for LocalLedgerClient {
    async fn submit(&self, transition: Transition) -> Result<TxReceipt> {
        let name = transition.name();
        let tokens = transition
            .tokens()
            .iter()
            .map(Address::short)
            .collect::<Vec<_>>()
            .join(",");
        let mut state = self.state.write().await;

        let mut next = state.ledger.clone();
        let transfers = next.apply(transition).map_err(|e| {
            warn!("Transition {} on [{}] rejected: {}", name, tokens, e);
            e
        })?;
        self.persist(&next).await?;
        state.ledger = next;

        let signature = Self::generate_signature(&mut state);
        debug!(
            "Transition {} on [{}] committed (tx {}, {} transfers)",
            name,
            tokens,
            state.tx_counter,
            transfers.len()
        );
        Ok(TxReceipt {
            signature,
            transfers,
        })
    }

    async fn distribution(&self, token: &Address) -> Result<Option<DistributionRecord>> {
        Ok(self.state.read().await.ledger.distribution(token).cloned())
    }

    async fn claimed(&self, token: &Address, recipient: &Address) -> Result<Amount> {
        Ok(self.state.read().await.ledger.claimed(token, recipient))
    }

    async fn claimed_batch(&self, token: &Address, recipients: &[Address]) -> Result<Vec<Amount>> {
        let state = self.state.read().await;
        Ok(recipients
            .iter()
            .map(|recipient| state.ledger.claimed(token, recipient))
            .collect())
    }
}

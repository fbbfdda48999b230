//! MerkleDrop Store
//!
//! Content-addressed storage for published distribution datasets.
//!
//! A dataset is serialized to its canonical JSON bytes and stored under the
//! SHA-256 digest of those bytes. That digest is the `StoragePointer` the
//! ledger records. Reads re-hash what comes back, so a tampered or corrupted
//! copy is rejected with `ContentMismatch` instead of being trusted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest as _, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use merkledrop_core::{CoreError, DistributionDataset, StoragePointer};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Dataset not found: {0}")]
    NotFound(StoragePointer),

    #[error("Stored content does not hash to {expected} (got {actual})")]
    ContentMismatch {
        expected: StoragePointer,
        actual: StoragePointer,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Pointer for a byte string.
pub fn content_pointer(bytes: &[u8]) -> StoragePointer {
    StoragePointer(Sha256::digest(bytes).into())
}

/// Content-addressed dataset store.
///
/// `get(put(x)) == x` for every dataset `x`.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn put(&self, dataset: &DistributionDataset) -> Result<StoragePointer>;

    async fn get(&self, pointer: StoragePointer) -> Result<DistributionDataset>;
}

fn decode_verified(pointer: StoragePointer, bytes: &[u8]) -> Result<DistributionDataset> {
    let actual = content_pointer(bytes);
    if actual != pointer {
        return Err(StoreError::ContentMismatch {
            expected: pointer,
            actual,
        });
    }
    Ok(DistributionDataset::from_json_slice(bytes)?)
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<StoragePointer, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the bytes behind `pointer` (for tamper tests).
    pub async fn put_raw(&self, pointer: StoragePointer, bytes: Vec<u8>) {
        self.blobs.write().await.insert(pointer, bytes);
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn put(&self, dataset: &DistributionDataset) -> Result<StoragePointer> {
        let bytes = dataset.to_json_bytes()?;
        let pointer = content_pointer(&bytes);
        debug!("Stored dataset {} ({} bytes)", pointer.short(), bytes.len());
        self.blobs.write().await.insert(pointer, bytes);
        Ok(pointer)
    }

    async fn get(&self, pointer: StoragePointer) -> Result<DistributionDataset> {
        let blobs = self.blobs.read().await;
        let bytes = blobs.get(&pointer).ok_or(StoreError::NotFound(pointer))?;
        decode_verified(pointer, bytes)
    }
}

/// Directory-backed store: one `<pointer>.json` file per dataset.
///
/// Files are immutable once written, so historic versions stay
/// retrievable for audit.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, pointer: &StoragePointer) -> PathBuf {
        self.dir.join(format!("{pointer}.json"))
    }
}

#[async_trait]
impl DatasetStore for FileStore {
    async fn put(&self, dataset: &DistributionDataset) -> Result<StoragePointer> {
        let bytes = dataset.to_json_bytes()?;
        let pointer = content_pointer(&bytes);
        let path = self.path_for(&pointer);

        if tokio::fs::try_exists(&path).await? {
            debug!("Dataset {} already stored", pointer.short());
            return Ok(pointer);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        // temp file + rename: never a partial file under a pointer name
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            "Stored dataset {} at {} ({} bytes)",
            pointer.short(),
            path.display(),
            bytes.len()
        );
        Ok(pointer)
    }

    async fn get(&self, pointer: StoragePointer) -> Result<DistributionDataset> {
        let path = self.path_for(&pointer);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(pointer))
            }
            Err(e) => return Err(e.into()),
        };
        decode_verified(pointer, &bytes)
    }
}

//! MerkleDrop Core Types
//!
//! Fundamental data structures shared by every MerkleDrop crate: addresses,
//! 256-bit amounts, digests, content pointers, parsed balance snapshots and
//! the published distribution dataset.

mod balance;
mod dataset;
mod error;
mod types;

pub use balance::BalanceMap;
pub use dataset::{DatasetEntry, DistributionDataset};
pub use error::*;
pub use types::*;

//! The published distribution dataset.
//!
//! A dataset is the authoritative recipient → cumulative amount mapping
//! behind one commitment. It is replaced wholesale on every update and is
//! immutable once published; historic versions stay retrievable by pointer.
//!
//! Wire format (JSON, `data` emitted in index order):
//!
//! ```json
//! {
//!   "token": "0x…",
//!   "merkleRoot": "0x…",
//!   "totalAmount": "201",
//!   "data": {
//!     "0x…": { "index": "0", "amount": "100", "breakdown": { "lpla": "100" } }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{checked_sum, decimal, digest_from_hex, digest_to_hex, DecimalAmount};
use crate::{Address, Amount, CoreError, Digest, Result, ZERO_DIGEST};

/// One recipient in a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
    pub address: Address,
    /// Dense position of this recipient's leaf in the commitment
    pub index: u64,
    /// Cumulative amount owed
    pub amount: Amount,
    /// Optional per-source contribution to `amount`
    pub breakdown: BTreeMap<String, Amount>,
}

impl DatasetEntry {
    pub fn new(address: Address, index: u64, amount: Amount) -> Self {
        Self {
            address,
            index,
            amount,
            breakdown: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionDataset {
    /// Token the dataset distributes (informational)
    pub token: Option<Address>,
    /// Commitment root declared for `entries`
    pub merkle_root: Digest,
    /// Sum of all entry amounts
    pub total_amount: Amount,
    entries: Vec<DatasetEntry>,
    positions: HashMap<Address, usize>,
}

impl Default for DistributionDataset {
    fn default() -> Self {
        Self::empty()
    }
}

impl DistributionDataset {
    /// The dataset behind a not-yet-existing distribution.
    pub fn empty() -> Self {
        Self {
            token: None,
            merkle_root: ZERO_DIGEST,
            total_amount: Amount::zero(),
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Assemble a dataset, validating its shape.
    ///
    /// Entries must be in index order with dense indices starting at 0,
    /// unique by address, and non-zero. The total is derived.
    pub fn from_entries(
        token: Option<Address>,
        merkle_root: Digest,
        entries: Vec<DatasetEntry>,
    ) -> Result<Self> {
        let mut positions = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.index != i as u64 {
                return Err(CoreError::MalformedDataset(format!(
                    "entry {} has index {}, expected {}",
                    entry.address, entry.index, i
                )));
            }
            if entry.amount.is_zero() {
                return Err(CoreError::MalformedDataset(format!(
                    "entry {} has zero amount",
                    entry.address
                )));
            }
            if positions.insert(entry.address, i).is_some() {
                return Err(CoreError::MalformedDataset(format!(
                    "duplicate recipient {}",
                    entry.address
                )));
            }
        }
        let total_amount = checked_sum(entries.iter().map(|e| &e.amount))?;
        Ok(Self {
            token,
            merkle_root,
            total_amount,
            entries,
            positions,
        })
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&DatasetEntry> {
        self.positions.get(address).map(|&i| &self.entries[i])
    }

    pub fn amount_of(&self, address: &Address) -> Amount {
        self.get(address).map(|e| e.amount).unwrap_or_default()
    }

    /// `(address, amount)` leaves in index order
    pub fn leaves(&self) -> Vec<(Address, Amount)> {
        self.entries.iter().map(|e| (e.address, e.amount)).collect()
    }

    /// Canonical serialized bytes (the content that gets addressed).
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::SerializationError(e.to_string()))
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::MalformedDataset(e.to_string()))
    }
}

// === Serialization ===

struct EntryData<'a>(&'a DatasetEntry);

impl Serialize for EntryData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entry = self.0;
        let fields = if entry.breakdown.is_empty() { 2 } else { 3 };
        let mut st = serializer.serialize_struct("EntryData", fields)?;
        st.serialize_field("index", &entry.index.to_string())?;
        st.serialize_field("amount", &DecimalAmount(entry.amount))?;
        if !entry.breakdown.is_empty() {
            let breakdown: BTreeMap<&str, DecimalAmount> = entry
                .breakdown
                .iter()
                .map(|(source, amount)| (source.as_str(), DecimalAmount(*amount)))
                .collect();
            st.serialize_field("breakdown", &breakdown)?;
        }
        st.end()
    }
}

struct EntriesData<'a>(&'a [DatasetEntry]);

impl Serialize for EntriesData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.address, &EntryData(entry))?;
        }
        map.end()
    }
}

impl Serialize for DistributionDataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = if self.token.is_some() { 4 } else { 3 };
        let mut st = serializer.serialize_struct("DistributionDataset", fields)?;
        if let Some(token) = &self.token {
            st.serialize_field("token", token)?;
        }
        st.serialize_field("merkleRoot", &digest_to_hex(&self.merkle_root))?;
        st.serialize_field("totalAmount", &DecimalAmount(self.total_amount))?;
        st.serialize_field("data", &EntriesData(&self.entries))?;
        st.end()
    }
}

#[derive(Deserialize)]
struct EntryFile {
    #[serde(with = "decimal")]
    index: Amount,
    #[serde(with = "decimal")]
    amount: Amount,
    #[serde(default)]
    breakdown: BTreeMap<String, DecimalAmount>,
}

/// Address-keyed entries in document order, rejecting repeated recipients.
struct EntryList(Vec<(Address, EntryFile)>);

impl<'de> Deserialize<'de> for EntryList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntryListVisitor;

        impl<'de> Visitor<'de> for EntryListVisitor {
            type Value = EntryList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping addresses to dataset entries")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<EntryList, A::Error> {
                let mut entries = Vec::new();
                while let Some(pair) = access.next_entry::<Address, EntryFile>()? {
                    entries.push(pair);
                }
                Ok(EntryList(entries))
            }
        }

        deserializer.deserialize_map(EntryListVisitor)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetFile {
    #[serde(default)]
    token: Option<Address>,
    merkle_root: String,
    #[serde(with = "decimal")]
    total_amount: Amount,
    data: EntryList,
}

impl TryFrom<DatasetFile> for DistributionDataset {
    type Error = CoreError;

    fn try_from(file: DatasetFile) -> Result<Self> {
        let merkle_root = digest_from_hex(&file.merkle_root)?;
        let mut entries = Vec::with_capacity(file.data.0.len());
        for (address, raw) in file.data.0 {
            if raw.index > Amount::from(u64::MAX) {
                return Err(CoreError::MalformedDataset(format!(
                    "index of {address} out of range"
                )));
            }
            entries.push(DatasetEntry {
                address,
                index: raw.index.low_u64(),
                amount: raw.amount,
                breakdown: raw.breakdown.into_iter().map(|(k, v)| (k, v.0)).collect(),
            });
        }
        entries.sort_by_key(|e| e.index);
        let dataset = DistributionDataset::from_entries(file.token, merkle_root, entries)?;
        if dataset.total_amount != file.total_amount {
            return Err(CoreError::MalformedDataset(format!(
                "declared total {} does not match entry sum {}",
                file.total_amount, dataset.total_amount
            )));
        }
        Ok(dataset)
    }
}

impl<'de> Deserialize<'de> for DistributionDataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let file = DatasetFile::deserialize(deserializer)?;
        DistributionDataset::try_from(file).map_err(de::Error::custom)
    }
}

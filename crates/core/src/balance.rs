//! Balance maps: the parsed form of a balance snapshot.
//!
//! A `BalanceMap` keeps recipients in first-seen order. Parsing is strict:
//! the input must be a JSON object whose keys are addresses and whose values
//! are non-negative integers (or decimal strings). Keys that differ only in
//! case name the same recipient and their amounts are summed.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{checked_sum, DecimalAmount};
use crate::{Address, Amount, CoreError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceMap {
    entries: Vec<(Address, Amount)>,
    positions: HashMap<Address, usize>,
}

impl BalanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a balance snapshot from JSON.
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| CoreError::InvalidInputData(e.to_string()))
    }

    /// Build from `(address, amount)` pairs, summing repeats.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Address, Amount)>,
    {
        let mut map = Self::new();
        for (address, amount) in pairs {
            map.add(address, amount)?;
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<Amount> {
        self.positions.get(address).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.positions.contains_key(address)
    }

    /// Add `amount` to `address`, appending the address if it is new.
    pub fn add(&mut self, address: Address, amount: Amount) -> Result<()> {
        match self.positions.get(&address) {
            Some(&i) => {
                let slot = &mut self.entries[i].1;
                *slot = slot.checked_add(amount).ok_or(CoreError::AmountOverflow)?;
            }
            None => {
                self.positions.insert(address, self.entries.len());
                self.entries.push((address, amount));
            }
        }
        Ok(())
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Address, &Amount) -> bool,
    {
        self.entries.retain(|(address, amount)| keep(address, amount));
        self.reindex();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.entries.iter().map(|(address, amount)| (address, amount))
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.entries.iter().map(|(address, _)| address)
    }

    pub fn total(&self) -> Result<Amount> {
        checked_sum(self.entries.iter().map(|(_, amount)| amount))
    }

    fn reindex(&mut self) {
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (address, _))| (*address, i))
            .collect();
    }
}

impl IntoIterator for BalanceMap {
    type Item = (Address, Amount);
    type IntoIter = std::vec::IntoIter<(Address, Amount)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for BalanceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (address, amount) in &self.entries {
            map.serialize_entry(address, &DecimalAmount(*amount))?;
        }
        map.end()
    }
}

struct BalanceMapVisitor;

impl<'de> Visitor<'de> for BalanceMapVisitor {
    type Value = BalanceMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping addresses to non-negative integer amounts")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> std::result::Result<BalanceMap, A::Error> {
        let mut map = BalanceMap::new();
        while let Some((address, amount)) = access.next_entry::<Address, DecimalAmount>()? {
            map.add(address, amount.0).map_err(de::Error::custom)?;
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for BalanceMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(BalanceMapVisitor)
    }
}

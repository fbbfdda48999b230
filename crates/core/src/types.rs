use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{CoreError, Result};

/// 256-bit unsigned token amount.
///
/// Leaves commit to amounts as 32-byte big-endian integers, so every amount
/// in the system fits in a `U256`. Arithmetic is always checked.
pub type Amount = primitive_types::U256;

/// 32-byte hash digest (Merkle roots, leaves, proof siblings)
pub type Digest = [u8; 32];

/// The all-zero digest, used as the root of an empty dataset
pub const ZERO_DIGEST: Digest = [0u8; 32];

/// 20-byte account identifier.
///
/// Parsed case-insensitively from hex (with or without `0x`), always
/// rendered in canonical lowercase `0x`-prefixed form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parse an address from a hex string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let cleaned = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if cleaned.len() != 40 {
            return Err(CoreError::InvalidAddress(format!(
                "{input}: expected 40 hex chars, got {}",
                cleaned.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(cleaned, &mut bytes)
            .map_err(|e| CoreError::InvalidAddress(format!("{input}: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(de::Error::custom)
    }
}

/// Content-addressed pointer to a serialized dataset in durable storage.
///
/// The pointer is the SHA-256 digest of the stored bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StoragePointer(pub Digest);

impl StoragePointer {
    pub const ZERO: StoragePointer = StoragePointer(ZERO_DIGEST);

    pub fn parse(input: &str) -> Result<Self> {
        digest_from_hex(input).map(Self)
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for StoragePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&digest_to_hex(&self.0))
    }
}

impl fmt::Debug for StoragePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoragePointer({self})")
    }
}

impl FromStr for StoragePointer {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for StoragePointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StoragePointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        StoragePointer::parse(&raw).map_err(de::Error::custom)
    }
}

/// Render a digest as `0x`-prefixed lowercase hex.
pub fn digest_to_hex(digest: &Digest) -> String {
    format!("0x{}", hex::encode(digest))
}

/// Parse a `0x`-prefixed (or bare) 64-char hex digest.
pub fn digest_from_hex(input: &str) -> Result<Digest> {
    let cleaned = input.trim().strip_prefix("0x").unwrap_or(input.trim());
    if cleaned.len() != 64 {
        return Err(CoreError::InvalidDigest(format!(
            "expected 64 hex chars, got {}",
            cleaned.len()
        )));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(cleaned, &mut out)
        .map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
    Ok(out)
}

/// Sum amounts, failing on 256-bit overflow.
pub fn checked_sum<'a, I>(amounts: I) -> Result<Amount>
where
    I: IntoIterator<Item = &'a Amount>,
{
    amounts
        .into_iter()
        .try_fold(Amount::zero(), |acc, amount| acc.checked_add(*amount))
        .ok_or(CoreError::AmountOverflow)
}

/// Parse a non-negative decimal integer string into an amount.
pub fn parse_amount(input: &str) -> Result<Amount> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidInputData(format!(
            "amount {input:?} is not a non-negative integer"
        )));
    }
    Amount::from_dec_str(trimmed)
        .map_err(|_| CoreError::InvalidInputData(format!("amount {input:?} exceeds 256 bits")))
}

/// Serde adapter: amounts as decimal strings on output; decimal strings or
/// non-negative JSON integers of any width on input. Fractions, exponents
/// and negatives are rejected.
pub mod decimal {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::{parse_amount, Amount};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        // numbers keep their literal digits (serde_json `arbitrary_precision`)
        match Value::deserialize(deserializer)? {
            Value::String(text) => parse_amount(&text).map_err(de::Error::custom),
            Value::Number(number) => parse_amount(&number.to_string()).map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "expected a non-negative integer or decimal string, found {other}"
            ))),
        }
    }
}

/// Serde adapter: digests as `0x`-prefixed hex strings.
pub mod hex_digest {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::{digest_from_hex, digest_to_hex, Digest};

    pub fn serialize<S: Serializer>(digest: &Digest, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&digest_to_hex(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Digest, D::Error> {
        let raw = String::deserialize(deserializer)?;
        digest_from_hex(&raw).map_err(de::Error::custom)
    }
}

/// Amount wrapper that (de)serializes through [`decimal`], for use as a
/// map value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecimalAmount(pub Amount);

impl Serialize for DecimalAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        decimal::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for DecimalAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        decimal::deserialize(deserializer).map(DecimalAmount)
    }
}

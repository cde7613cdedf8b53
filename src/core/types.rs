//! Identifiers and value units shared across the wallet
//!
//! - [`Address`]: 20-byte account identifier, rendered as `0x` + 40 hex digits
//! - [`Amount`]: native value in the smallest unit (wei)
//! - [`OperationId`]: 32-byte digest naming a pending operation

use crate::crypto::sha256_array;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Native value in the smallest unit
pub type Amount = u128;

/// Smallest units per gwei
pub const WEI_PER_GWEI: Amount = 1_000_000_000;

/// Smallest units per ether
pub const WEI_PER_ETH: Amount = 1_000_000_000_000_000_000;

/// Address parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address length: expected 40 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("Invalid address hex: {0}")]
    InvalidHex(String),
}

/// Amount parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("Empty amount")]
    Empty,
    #[error("Invalid amount: {0}")]
    InvalidNumber(String),
    #[error("Too many decimal places for {unit}: at most {max}")]
    TooManyDecimals { unit: &'static str, max: u32 },
    #[error("Amount overflows 128 bits")]
    Overflow,
}

/// Operation id parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationIdError {
    #[error("Invalid operation id length: expected 64 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("Invalid operation id hex: {0}")]
    InvalidHex(String),
}

/// A 20-byte account identifier
///
/// The all-zero address is the null identifier and is never a valid owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The null address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic address from a human-readable label
    ///
    /// Address = last 20 bytes of SHA256(label). Handy for fixtures and demos.
    pub fn from_label(label: &str) -> Self {
        let hash = sha256_array(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the null address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.len() != 40 {
            return Err(AddressError::InvalidLength(digits.len()));
        }

        let decoded =
            hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Deterministic identifier of an operation
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId([u8; 32]);

impl OperationId {
    /// Wrap a raw digest
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 hex digits, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.short())
    }
}

impl FromStr for OperationId {
    type Err = OperationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);

        if digits.len() != 64 {
            return Err(OperationIdError::InvalidLength(digits.len()));
        }

        let decoded =
            hex::decode(digits).map_err(|e| OperationIdError::InvalidHex(e.to_string()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl Serialize for OperationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OperationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Parse a human-entered amount
///
/// Accepts plain integers (wei) or decimals with an `eth`, `gwei` or `wei`
/// suffix, e.g. `"1000"`, `"0.5eth"`, `"20 gwei"`.
pub fn parse_amount(input: &str) -> Result<Amount, AmountParseError> {
    let lowered = input.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let (number, unit, decimals) = if let Some(n) = lowered.strip_suffix("gwei") {
        (n, "gwei", 9u32)
    } else if let Some(n) = lowered.strip_suffix("wei") {
        (n, "wei", 0)
    } else if let Some(n) = lowered.strip_suffix("eth") {
        (n, "eth", 18)
    } else {
        (lowered.as_str(), "wei", 0)
    };
    let number = number.trim();

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };

    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountParseError::InvalidNumber(input.to_string()));
    }
    if fraction.len() as u32 > decimals {
        return Err(AmountParseError::TooManyDecimals {
            unit,
            max: decimals,
        });
    }

    let scale = 10u128.pow(decimals);
    let whole_value: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| AmountParseError::Overflow)?
    };
    let fraction_value: Amount = if fraction.is_empty() {
        0
    } else {
        let padding = 10u128.pow(decimals - fraction.len() as u32);
        fraction
            .parse::<Amount>()
            .map_err(|_| AmountParseError::Overflow)?
            * padding
    };

    whole_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_value))
        .ok_or(AmountParseError::Overflow)
}

/// Format an amount as ether with trailing zeros trimmed, e.g. `"0.5 ETH"`
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / WEI_PER_ETH;
    let fraction = amount % WEI_PER_ETH;
    if fraction == 0 {
        return format!("{} ETH", whole);
    }
    let digits = format!("{:018}", fraction);
    format!("{}.{} ETH", whole, digits.trim_end_matches('0'))
}

/// Serde adapter writing amounts as decimal strings
///
/// JSON numbers cannot carry 128-bit values reliably, so amounts travel as
/// strings. Deserialization also accepts unit suffixes and small integers.
pub mod amount_serde {
    use super::{parse_amount, Amount};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an amount as a string or non-negative integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            parse_amount(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(Amount::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            Amount::try_from(v).map_err(|_| E::custom("amount cannot be negative"))
        }
    }
}

/// Serde adapter writing byte payloads as hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}

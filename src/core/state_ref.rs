//! Ledger identifiers: transaction hashes, state references and how a
//! conflicting transaction consumed a state.

use super::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32-byte transaction identifier as assigned by the ledger.
///
/// Displayed and serialized as 64 upper-case hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecureHash([u8; 32]);

impl SecureHash {
    /// Length of the digest in bytes.
    pub const LENGTH: usize = 32;

    /// The all-zero hash.
    pub const ZERO: Self = Self([0; 32]);

    /// Wraps raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns a fresh random hash, useful for tests and fixtures.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureHash({})", self)
    }
}

impl FromStr for SecureHash {
    type Err = CoreError;

    /// Parses 64 hexadecimal characters, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for SecureHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SecureHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A pointer to one output of one transaction: the identity of a single
/// version of a ledger record.
///
/// The executor never looks inside a `StateRef`; it only compares, hashes
/// and collects them. Serialized in its display form so it can key maps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateRef {
    /// Transaction that produced the state.
    pub txhash: SecureHash,
    /// Output index within that transaction.
    pub index: u32,
}

impl StateRef {
    pub const fn new(txhash: SecureHash, index: u32) -> Self {
        Self { txhash, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.txhash, self.index)
    }
}

impl fmt::Debug for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateRef({})", self)
    }
}

impl FromStr for StateRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidStateRef(s.to_string());

        let (hash, rest) = s.split_once('(').ok_or_else(invalid)?;
        let index = rest.strip_suffix(')').ok_or_else(invalid)?;

        Ok(Self {
            txhash: hash.parse().map_err(|_| invalid())?,
            index: index.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for StateRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a conflicting, already-notarised transaction used a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumptionKind {
    /// The state was read as a reference state and left unspent.
    ReferenceOnly,
    /// The state was spent as a transaction input.
    SpentAsInput,
}

impl ConsumptionKind {
    /// Only reference-only conflicts can be resolved by waiting for newer data.
    pub fn is_reference(self) -> bool {
        matches!(self, ConsumptionKind::ReferenceOnly)
    }
}

/// The notary's record of a state that was already consumed when a
/// transaction tried to use it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConsumptionDetails {
    /// Hash of the id of the transaction that consumed the state first.
    pub hash_of_transaction_id: SecureHash,
    /// How the conflicting transaction was trying to use the state.
    pub kind: ConsumptionKind,
}

impl StateConsumptionDetails {
    pub fn reference(hash_of_transaction_id: SecureHash) -> Self {
        Self {
            hash_of_transaction_id,
            kind: ConsumptionKind::ReferenceOnly,
        }
    }

    pub fn input(hash_of_transaction_id: SecureHash) -> Self {
        Self {
            hash_of_transaction_id,
            kind: ConsumptionKind::SpentAsInput,
        }
    }
}

//! Errors reported by the notary when it refuses to finalise a transaction.

use super::state_ref::{SecureHash, StateConsumptionDetails, StateRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Structured reason a notary gave for rejecting a transaction.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum NotaryError {
    /// One or more input or reference states were already consumed by another,
    /// already-notarised transaction.
    #[error(
        "{} input or reference state(s) of transaction {tx_id} were already consumed",
        .consumed_states.len()
    )]
    Conflict {
        tx_id: SecureHash,
        consumed_states: BTreeMap<StateRef, StateConsumptionDetails>,
    },

    /// The transaction's time window does not cover the notary's clock.
    #[error("current time {current_time} is outside the transaction time window")]
    TimeWindowInvalid {
        current_time: DateTime<Utc>,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    },

    /// The transaction failed notary-side verification.
    #[error("transaction is invalid: {reason}")]
    TransactionInvalid { reason: String },

    /// The transaction names a different notary.
    #[error("transaction was sent to the wrong notary")]
    WrongNotary,

    /// The notarisation request was not signed by a party to the transaction.
    #[error("request signature is invalid: {reason}")]
    RequestSignatureInvalid { reason: String },

    /// Any other notary-side failure.
    #[error("notary error: {reason}")]
    General { reason: String },
}

impl NotaryError {
    /// Returns true for a state conflict, whatever kind of states it names.
    pub fn is_conflict(&self) -> bool {
        matches!(self, NotaryError::Conflict { .. })
    }
}

/// The consensus error raised to a flow that asked a notary to finalise a
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotaryException {
    /// Why the notary refused.
    pub error: NotaryError,
    /// The transaction that was being notarised, if known.
    pub tx_id: Option<SecureHash>,
}

impl NotaryException {
    pub fn new(error: NotaryError, tx_id: Option<SecureHash>) -> Self {
        Self { error, tx_id }
    }

    /// Builds a conflict error for `tx_id` from its consumed-state details.
    pub fn conflict(
        tx_id: SecureHash,
        consumed_states: impl IntoIterator<Item = (StateRef, StateConsumptionDetails)>,
    ) -> Self {
        Self {
            error: NotaryError::Conflict {
                tx_id,
                consumed_states: consumed_states.into_iter().collect(),
            },
            tx_id: Some(tx_id),
        }
    }
}

impl fmt::Display for NotaryException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tx_id {
            Some(tx_id) => write!(f, "unable to notarise transaction {}", tx_id),
            None => write!(f, "unable to notarise transaction"),
        }
    }
}

impl std::error::Error for NotaryException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

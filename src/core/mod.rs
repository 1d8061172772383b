//! Core types and utilities for the palin retry engine.
//!
//! This module provides the vocabulary shared by every other module:
//!
//! # Ledger Model
//! - [`StateRef`]: One output of one transaction, the unit a conflict names
//! - [`SecureHash`]: Transaction identifier
//! - [`ConsumptionKind`]: Whether a conflicting transaction referenced or spent a state
//!
//! # Notary Errors
//! - [`NotaryException`]: The consensus error raised to a flow
//! - [`NotaryError`]: The structured reason behind it
//!
//! # Serialization
//! - [`serialize_value`] / [`deserialize_value`]: JSON encoding for checkpoints
//! - [`stable_hash`]: Release-stable hashing for error codes
//!
//! # Retry Limits
//! - [`RetryCeiling`]: Optional attempt and time bounds
//! - [`EmptyConflictPolicy`]: Handling of conflicts with nothing to wait for

mod error;
mod notary;
pub mod retry;
mod serialization;
mod state_ref;

pub use error::{CoreError, Result};
pub use notary::{NotaryError, NotaryException};
pub use retry::{EmptyConflictPolicy, RetryCeiling};
pub use serialization::{deserialize_value, serialize_value, stable_hash};
pub use state_ref::{ConsumptionKind, SecureHash, StateConsumptionDetails, StateRef};

//! Conflict classification.
//!
//! This module hides the decision of which flow failures are worth waiting
//! out. It is the only place in the crate that looks inside a
//! [`FlowError`]; everything it does not recognise as a conflict on
//! reference states is reported as fatal.

use super::error::FlowError;
use crate::core::{NotaryError, StateRef};
use std::collections::BTreeSet;

/// The outcome of one flow attempt, as seen by the retry executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification<T> {
    /// The flow completed and produced a value.
    Success(T),
    /// The notary rejected the transaction because reference states were
    /// stale. `refs` holds the reference-only states; it is empty when every
    /// conflicting state was spent as an input.
    ReferenceConflict {
        refs: BTreeSet<StateRef>,
        error: FlowError,
    },
    /// Any other failure. Never retried.
    Fatal(FlowError),
}

impl<T> Classification<T> {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Classification::Success(_) => "success",
            Classification::ReferenceConflict { .. } => "reference_conflict",
            Classification::Fatal(_) => "fatal",
        }
    }
}

/// Classifies the result of a flow attempt.
///
/// - `Ok(value)` is a success.
/// - A notary conflict becomes a reference conflict over the states that
///   were consumed as reference-only; states spent as inputs are dropped.
/// - Every other error, including every other notary error, is fatal and
///   carried through unchanged.
///
/// # Example
///
/// ```
/// use palin::core::{NotaryException, SecureHash, StateConsumptionDetails, StateRef};
/// use palin::executor::{classify, Classification, FlowError};
///
/// let tx = SecureHash::new([1; 32]);
/// let a = StateRef::new(tx, 0);
/// let b = StateRef::new(tx, 1);
/// let error: FlowError = NotaryException::conflict(
///     tx,
///     [
///         (a, StateConsumptionDetails::reference(tx)),
///         (b, StateConsumptionDetails::input(tx)),
///     ],
/// )
/// .into();
///
/// match classify::<()>(Err(error)) {
///     Classification::ReferenceConflict { refs, .. } => {
///         assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![a]);
///     }
///     other => panic!("unexpected {}", other.kind()),
/// }
/// ```
pub fn classify<T>(result: Result<T, FlowError>) -> Classification<T> {
    match result {
        Ok(value) => Classification::Success(value),
        Err(error) => match error.notary_error().and_then(reference_conflicts) {
            Some(refs) => Classification::ReferenceConflict { refs, error },
            None => Classification::Fatal(error),
        },
    }
}

/// Returns the reference-only states named by a notary conflict, or `None`
/// if the error is not a conflict.
pub fn reference_conflicts(error: &NotaryError) -> Option<BTreeSet<StateRef>> {
    match error {
        NotaryError::Conflict {
            consumed_states, ..
        } => Some(
            consumed_states
                .iter()
                .filter(|(_, details)| details.kind.is_reference())
                .map(|(state, _)| *state)
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NotaryException, SecureHash, StateConsumptionDetails};

    fn tx(n: u8) -> SecureHash {
        SecureHash::new([n; 32])
    }

    fn conflict(entries: &[(StateRef, StateConsumptionDetails)]) -> FlowError {
        NotaryException::conflict(tx(99), entries.iter().copied()).into()
    }

    #[test]
    fn test_success_passes_value_through() {
        assert_eq!(classify::<&str>(Ok("ok")), Classification::Success("ok"));
    }

    #[test]
    fn test_non_notary_error_is_fatal_and_unchanged() {
        let error = FlowError::flow("counterparty rejected the proposal");
        assert_eq!(
            classify::<()>(Err(error.clone())),
            Classification::Fatal(error)
        );
    }

    #[test]
    fn test_other_notary_errors_are_fatal() {
        let reasons = vec![
            NotaryError::WrongNotary,
            NotaryError::TransactionInvalid {
                reason: "contract verification failed".into(),
            },
            NotaryError::RequestSignatureInvalid {
                reason: "unknown signer".into(),
            },
            NotaryError::General {
                reason: "timeout".into(),
            },
            NotaryError::TimeWindowInvalid {
                current_time: chrono::Utc::now(),
                from: None,
                until: None,
            },
        ];

        for reason in reasons {
            let error: FlowError = NotaryException::new(reason, Some(tx(1))).into();
            let classification = classify::<()>(Err(error.clone()));
            assert_eq!(classification, Classification::Fatal(error));
        }
    }

    #[test]
    fn test_mixed_conflict_keeps_only_reference_states() {
        let a = StateRef::new(tx(1), 0);
        let b = StateRef::new(tx(2), 0);
        let c = StateRef::new(tx(3), 1);
        let error = conflict(&[
            (a, StateConsumptionDetails::reference(tx(10))),
            (b, StateConsumptionDetails::input(tx(11))),
            (c, StateConsumptionDetails::reference(tx(12))),
        ]);

        match classify::<()>(Err(error.clone())) {
            Classification::ReferenceConflict { refs, error: kept } => {
                assert_eq!(refs, BTreeSet::from([a, c]));
                assert_eq!(kept, error);
            }
            other => panic!("expected reference conflict, got {}", other.kind()),
        }
    }

    #[test]
    fn test_input_only_conflict_yields_empty_reference_set() {
        let error = conflict(&[(StateRef::new(tx(1), 0), StateConsumptionDetails::input(tx(5)))]);

        match classify::<()>(Err(error)) {
            Classification::ReferenceConflict { refs, .. } => assert!(refs.is_empty()),
            other => panic!("expected reference conflict, got {}", other.kind()),
        }
    }

    #[test]
    fn test_reference_conflicts_ignores_non_conflicts() {
        assert!(reference_conflicts(&NotaryError::WrongNotary).is_none());
    }
}

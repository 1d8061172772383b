use crate::core::{CoreError, NotaryError, NotaryException};
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A boxed error that can be sent across threads.
///
/// Flows use this for failures the retry executor has no business
/// understanding (I/O, bugs surfaced as errors, unrelated services).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Flow-level errors: the only errors the retry executor inspects.
///
/// Anything a flow reports through this type is classified. A notary
/// conflict on reference states is retried; every other `FlowError` is
/// handed back to the caller exactly as the flow produced it.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FlowError {
    /// The notary refused to finalise the flow's transaction.
    #[error(transparent)]
    Notary(#[from] NotaryException),

    /// Any other flow-level failure.
    #[error("flow failed: {message}")]
    Flow { message: String },
}

impl FlowError {
    /// Creates a plain flow failure with the given message.
    pub fn flow(message: impl Into<String>) -> Self {
        FlowError::Flow {
            message: message.into(),
        }
    }

    /// Returns the notary's structured reason, if this is a consensus error.
    pub fn notary_error(&self) -> Option<&NotaryError> {
        match self {
            FlowError::Notary(exception) => Some(&exception.error),
            FlowError::Flow { .. } => None,
        }
    }
}

/// How a single flow attempt failed.
///
/// This makes the recoverable/unrecoverable boundary explicit at the point
/// where a flow returns:
/// - `Flow`: a flow-level error, fed to the classifier
/// - `Unrelated`: anything else, returned to the caller without inspection
#[derive(Debug, Error)]
pub enum FlowFailure {
    /// A flow-level error the executor knows how to classify.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// An error the executor does not recognise.
    #[error("{0}")]
    Unrelated(BoxError),
}

impl FlowFailure {
    /// Wraps an arbitrary error as unrelated to reference-state conflicts.
    pub fn unrelated(error: impl Into<BoxError>) -> Self {
        FlowFailure::Unrelated(error.into())
    }
}

impl From<NotaryException> for FlowFailure {
    fn from(e: NotaryException) -> Self {
        FlowFailure::Flow(FlowError::Notary(e))
    }
}

/// Why waiting for state updates stopped without the states being updated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WaitError {
    /// The subscription was torn down (shutdown or cancellation).
    #[error("wait for state updates was cancelled")]
    Cancelled,

    /// The backing update source failed.
    #[error("state update source failed: {0}")]
    Source(String),
}

/// Error returned by [`RetryExecutor::execute`](super::RetryExecutor::execute).
///
/// Except for `Cancelled`, `RetriesExhausted` and the checkpoint variants,
/// the caller sees exactly the error the flow itself produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// A flow-level error that is not a reference conflict, unchanged.
    #[error(transparent)]
    Flow(FlowError),

    /// An error the flow raised that the executor does not classify.
    #[error("{0}")]
    Unrelated(BoxError),

    /// Waiting for reference states was interrupted.
    #[error("reference state retry cancelled")]
    Cancelled,

    /// The configured retry ceiling was reached while conflicts persisted.
    #[error("gave up after {attempts} attempt(s) in {elapsed:?}")]
    RetriesExhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: FlowError,
    },

    /// The state update source failed while waiting.
    #[error("state update source failed: {0}")]
    Source(String),

    /// A checkpoint could not be stored or loaded.
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// A checkpoint could not be encoded or decoded.
    #[error("core error: {0}")]
    Core(String),
}

impl ExecutionError {
    /// Returns the flow-level error carried by this error, if any.
    ///
    /// For `Flow` this is the flow's error unchanged; for
    /// `RetriesExhausted` it is the last conflict seen.
    pub fn flow_error(&self) -> Option<&FlowError> {
        match self {
            ExecutionError::Flow(e) => Some(e),
            ExecutionError::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true if the executor stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

// Manual From implementations to convert nested errors to strings
impl From<StorageError> for ExecutionError {
    fn from(e: StorageError) -> Self {
        ExecutionError::Storage(e.to_string())
    }
}

impl From<CoreError> for ExecutionError {
    fn from(e: CoreError) -> Self {
        ExecutionError::Core(e.to_string())
    }
}

impl From<WaitError> for ExecutionError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Cancelled => ExecutionError::Cancelled,
            WaitError::Source(message) => ExecutionError::Source(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SecureHash, StateConsumptionDetails, StateRef};

    #[test]
    fn test_flow_error_exposes_notary_reason() {
        let tx = SecureHash::new([1; 32]);
        let error: FlowError = NotaryException::conflict(
            tx,
            [(
                StateRef::new(tx, 0),
                StateConsumptionDetails::reference(tx),
            )],
        )
        .into();

        assert!(error.notary_error().is_some_and(NotaryError::is_conflict));
        assert!(FlowError::flow("boom").notary_error().is_none());
    }

    #[test]
    fn test_flow_error_display_is_transparent() {
        let exception = NotaryException::new(NotaryError::WrongNotary, None);
        let error = FlowError::from(exception.clone());
        assert_eq!(error.to_string(), exception.to_string());
    }

    #[test]
    fn test_flow_failure_conversions() {
        let failure: FlowFailure = NotaryException::new(NotaryError::WrongNotary, None).into();
        assert!(matches!(failure, FlowFailure::Flow(FlowError::Notary(_))));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let failure = FlowFailure::unrelated(io);
        assert!(matches!(failure, FlowFailure::Unrelated(_)));
        assert_eq!(failure.to_string(), "disk full");
    }

    #[test]
    fn test_wait_error_maps_to_execution_error() {
        assert!(ExecutionError::from(WaitError::Cancelled).is_cancelled());
        assert!(matches!(
            ExecutionError::from(WaitError::Source("feed closed".into())),
            ExecutionError::Source(_)
        ));
    }

    #[test]
    fn test_retries_exhausted_keeps_last_conflict() {
        let source = FlowError::flow("stale");
        let error = ExecutionError::RetriesExhausted {
            attempts: 3,
            elapsed: Duration::from_millis(10),
            source: source.clone(),
        };

        assert_eq!(error.flow_error(), Some(&source));
        assert!(error.to_string().starts_with("gave up after 3 attempt(s)"));
    }
}

//! Execution engine for reference-state retries.
//!
//! Module organization following Parnas's information hiding principles:
//! - classify: Hides which failures count as reference conflicts
//! - waiter: Hides where state updates come from
//! - progress: Exposes only observable progress, never read back
//! - report: Hides how error codes are derived
//! - retry: Hides the attempt/wait loop and its checkpointing

mod classify;
mod error;
mod flow;
mod progress;
mod report;
mod retry;
mod waiter;

pub use classify::{classify, reference_conflicts, Classification};
pub use error::{BoxError, ExecutionError, FlowError, FlowFailure, Result, WaitError};
pub use flow::Flow;
pub use progress::{ProgressStep, ProgressTracker};
pub use report::{ChainHashCodeDeriver, ErrorCodeDeriver};
pub use retry::RetryExecutor;
pub use waiter::{StateSubscription, StateUpdateSource, UpdateWaiter, VaultUpdateWaiter};

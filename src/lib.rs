//! Palin: reference-state conflict retry for ledger flows
//!
//! `palin` (πάλιν, Greek for "again") runs a ledger flow and, when the notary
//! rejects it only because a reference state it read has since been
//! superseded, waits for the vault to learn about the newer state and runs
//! the flow again from a fresh instance. Every other failure reaches the
//! caller exactly as the flow raised it.
//!
//! # Features
//!
//! - **Precise classification**: Only conflicts on reference-only states are retried
//! - **Event-driven waiting**: Suspends on a shared vault feed instead of polling
//! - **Observable progress**: Attempting, Retrying and Success steps on a broadcast stream
//! - **Resumable**: Optional checkpoints let a restarted node continue a suspended retry
//! - **Bounded on request**: Unbounded by default, with optional attempt and time ceilings
//!
//! # Quick Start
//!
//! ```no_run
//! use palin::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let feed = Arc::new(InMemoryVaultFeed::new());
//!     let executor = RetryExecutor::new(VaultUpdateWaiter::new(feed.clone()))
//!         .with_name("move_asset");
//!
//!     let result = executor
//!         .execute(|| async {
//!             // Build, sign and notarise a transaction here
//!             Ok::<_, FlowFailure>("notarised")
//!         })
//!         .await?;
//!
//!     println!("Result: {}", result);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! Following Parnas's information hiding principles, each module hides specific design
//! decisions that are likely to change:
//!
//! - [`core`]: Ledger vocabulary and notary errors (hides serialization format)
//! - [`executor`]: Classification, waiting and the retry loop (hides retry strategy)
//! - [`storage`]: Update feed and checkpoint backends (hides where state lives)
//!
//! # Design Principles
//!
//! This library follows Dave Cheney's practical programming wisdom:
//! - **Simplicity**: Simple, focused APIs that do one thing well
//! - **Clarity**: Explicit over implicit, readable over clever
//! - **Safety**: Hard to misuse, defaults prevent common mistakes

pub mod core;
pub mod executor;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{
    deserialize_value, serialize_value, CoreError, EmptyConflictPolicy, NotaryError,
    NotaryException, Result as CoreResult, RetryCeiling, SecureHash, StateConsumptionDetails,
    StateRef,
};

pub use executor::{
    classify, Classification, ExecutionError, Flow, FlowError, FlowFailure, ProgressStep,
    ProgressTracker, Result as ExecutionResult, RetryExecutor, UpdateWaiter, VaultUpdateWaiter,
    WaitError,
};

pub use storage::{
    CheckpointStore, InMemoryCheckpointStore, InMemoryVaultFeed, Result as StorageResult,
    RetryCheckpoint, RetryPhase, StorageError, VaultUpdate,
};

// Re-export dependencies used in public API
// This ensures users don't have version mismatch errors (Effective Rust Item 24)
pub use tokio;
pub use tokio_util; // Users pass CancellationToken to execute_with_cancellation
pub use uuid; // Users create Uuid::new_v4() for checkpoint keys

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```
/// use palin::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        ConsumptionKind, EmptyConflictPolicy, NotaryError, NotaryException, RetryCeiling,
        SecureHash, StateConsumptionDetails, StateRef,
    };

    pub use crate::executor::{
        Classification, ExecutionError, Flow, FlowError, FlowFailure, ProgressStep,
        ProgressTracker, Result as ExecutionResult, RetryExecutor, StateUpdateSource,
        UpdateWaiter, VaultUpdateWaiter, WaitError,
    };

    pub use crate::storage::{
        CheckpointStore, InMemoryCheckpointStore, InMemoryVaultFeed, RetryCheckpoint,
        RetryPhase, StorageError, VaultUpdate,
    };

    // Re-export commonly used external types
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
    pub use uuid::Uuid;
}

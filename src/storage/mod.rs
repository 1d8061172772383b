//! Storage layer for reference-state retries.
//!
//! This module provides two independent backends:
//!
//! - [`InMemoryVaultFeed`]: a shared feed of consumed states that many
//!   waiters can subscribe to at once
//! - [`InMemoryCheckpointStore`]: persistence for the phase a retry loop is
//!   in, so it can resume after a restart
//!
//! # Example
//!
//! ```no_run
//! use palin::storage::{CheckpointStore, InMemoryCheckpointStore, RetryCheckpoint};
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryCheckpointStore::new();
//! let checkpoint = RetryCheckpoint::attempting(Uuid::new_v4(), 0);
//! store.save(&checkpoint).await?;
//! assert!(store.load(checkpoint.flow_id).await?.is_some());
//! # Ok(())
//! # }
//! ```

use crate::core::StateRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

mod error;
pub mod feed;
pub mod memory;

pub use error::{Result, StorageError};
pub use feed::{InMemoryVaultFeed, VaultUpdate};
pub use memory::InMemoryCheckpointStore;

/// Where a retry loop was when it last checkpointed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPhase {
    /// About to run (or running) the next attempt.
    Attempting,
    /// Suspended until `refs` have been updated.
    Waiting { refs: BTreeSet<StateRef> },
}

/// Durable snapshot of a retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCheckpoint {
    pub flow_id: Uuid,
    /// Attempts already made.
    pub attempt: u32,
    pub phase: RetryPhase,
    pub updated_at: DateTime<Utc>,
}

impl RetryCheckpoint {
    pub fn attempting(flow_id: Uuid, attempt: u32) -> Self {
        Self {
            flow_id,
            attempt,
            phase: RetryPhase::Attempting,
            updated_at: Utc::now(),
        }
    }

    pub fn waiting(flow_id: Uuid, attempt: u32, refs: BTreeSet<StateRef>) -> Self {
        Self {
            flow_id,
            attempt,
            phase: RetryPhase::Waiting { refs },
            updated_at: Utc::now(),
        }
    }

    /// The states this checkpoint is waiting on, if it is suspended.
    pub fn waiting_on(&self) -> Option<&BTreeSet<StateRef>> {
        match &self.phase {
            RetryPhase::Waiting { refs } => Some(refs),
            RetryPhase::Attempting => None,
        }
    }
}

/// Trait for checkpoint storage backends.
///
/// Implementations must be thread-safe. Using `async_trait` allows truly
/// async backends without forcing blocking calls in async contexts.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stores `checkpoint`, replacing any previous checkpoint for its flow.
    async fn save(&self, checkpoint: &RetryCheckpoint) -> Result<()>;

    /// Loads the checkpoint for `flow_id`, if one exists.
    async fn load(&self, flow_id: Uuid) -> Result<Option<RetryCheckpoint>>;

    /// Removes the checkpoint for `flow_id`. Returns true if one existed.
    async fn remove(&self, flow_id: Uuid) -> Result<bool>;

    /// Every stored checkpoint, i.e. every retry loop that has not finished.
    async fn list(&self) -> Result<Vec<RetryCheckpoint>>;
}

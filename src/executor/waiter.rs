//! Waiting for reference states to be superseded.
//!
//! This module hides the complexity of:
//! - Turning a set of stale states into a single suspension point
//! - Resolving immediately when nothing is left to wait for
//! - Reporting teardown of the update source as cancellation
//!
//! Following Parnas's information hiding principle, the executor only sees
//! [`UpdateWaiter`]; where updates come from is a storage concern.

use super::error::WaitError;
use crate::core::StateRef;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Suspends a flow until a set of states has been superseded.
#[async_trait]
pub trait UpdateWaiter: Send + Sync {
    /// Returns once every state in `refs` has been consumed by a notarised
    /// transaction and its successor is known to this node.
    ///
    /// # Errors
    /// Returns `WaitError::Cancelled` if the wait is torn down before the
    /// states are updated. It never returns `Ok` early.
    async fn wait_for_update(&self, refs: &BTreeSet<StateRef>) -> Result<(), WaitError>;
}

#[async_trait]
impl<W: UpdateWaiter + ?Sized> UpdateWaiter for Arc<W> {
    async fn wait_for_update(&self, refs: &BTreeSet<StateRef>) -> Result<(), WaitError> {
        (**self).wait_for_update(refs).await
    }
}

/// A source of state-update notifications shared by many waiters.
pub trait StateUpdateSource: Send + Sync {
    /// Registers interest in `refs`.
    ///
    /// The returned subscription resolves once all of `refs` are consumed,
    /// including states consumed before the call.
    ///
    /// # Errors
    /// Returns `WaitError::Cancelled` if the source has shut down.
    fn subscribe(&self, refs: BTreeSet<StateRef>) -> Result<StateSubscription, WaitError>;
}

impl<S: StateUpdateSource + ?Sized> StateUpdateSource for Arc<S> {
    fn subscribe(&self, refs: BTreeSet<StateRef>) -> Result<StateSubscription, WaitError> {
        (**self).subscribe(refs)
    }
}

/// A pending interest in a set of states.
///
/// Dropping a subscription before it resolves deregisters it from its
/// source.
pub struct StateSubscription {
    ready: oneshot::Receiver<()>,
    shutdown: CancellationToken,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StateSubscription {
    /// Creates a subscription that resolves when `ready` fires.
    ///
    /// `shutdown` cancels the wait; `release` runs on drop so the source can
    /// forget the subscription.
    pub fn new(
        ready: oneshot::Receiver<()>,
        shutdown: CancellationToken,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            ready,
            shutdown,
            release: Some(Box::new(release)),
        }
    }

    /// A subscription that is already satisfied.
    pub fn resolved() -> Self {
        let (tx, ready) = oneshot::channel();
        let _ = tx.send(());
        Self {
            ready,
            shutdown: CancellationToken::new(),
            release: None,
        }
    }

    /// Waits for the subscribed states to be updated.
    ///
    /// # Errors
    /// Returns `WaitError::Cancelled` if the source shuts down or is
    /// dropped first.
    pub async fn wait(mut self) -> Result<(), WaitError> {
        tokio::select! {
            biased;
            ready = &mut self.ready => ready.map_err(|_| WaitError::Cancelled),
            _ = self.shutdown.cancelled() => Err(WaitError::Cancelled),
        }
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// [`UpdateWaiter`] backed by a [`StateUpdateSource`] such as the vault's
/// update feed.
///
/// # Example
/// ```no_run
/// use palin::executor::{UpdateWaiter, VaultUpdateWaiter};
/// use palin::storage::InMemoryVaultFeed;
/// use std::collections::BTreeSet;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let feed = Arc::new(InMemoryVaultFeed::new());
/// let waiter = VaultUpdateWaiter::new(feed.clone());
/// waiter.wait_for_update(&BTreeSet::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct VaultUpdateWaiter<S> {
    source: S,
}

impl<S: StateUpdateSource> VaultUpdateWaiter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Returns the underlying update source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: StateUpdateSource> UpdateWaiter for VaultUpdateWaiter<S> {
    async fn wait_for_update(&self, refs: &BTreeSet<StateRef>) -> Result<(), WaitError> {
        if refs.is_empty() {
            // Nothing to wait for. Yield once so a caller looping on this
            // does not starve the runtime, then let it retry.
            debug!("Empty state set, returning without waiting (possible tight retry)");
            tokio::task::yield_now().await;
            return Ok(());
        }

        debug!(states = refs.len(), "Subscribing to state updates");
        self.source.subscribe(refs.clone())?.wait().await
    }
}

//! In-memory feed of vault updates.
//!
//! Every notarised transaction this node learns about is published as a
//! [`VaultUpdate`]. Waiters subscribe to the states they are stuck on and are
//! woken once all of them have been consumed.
//!
//! The feed keeps an index from state to interested waiters, so a single
//! update only touches the waiters that named one of its consumed states.
//! Overlapping subscriptions are independent: each waiter tracks its own
//! remaining states and is notified exactly once.

use crate::core::StateRef;
use crate::executor::{StateSubscription, StateUpdateSource, WaitError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// States consumed and produced by one notarised transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultUpdate {
    pub consumed: BTreeSet<StateRef>,
    pub produced: BTreeSet<StateRef>,
}

impl VaultUpdate {
    pub fn new(
        consumed: impl IntoIterator<Item = StateRef>,
        produced: impl IntoIterator<Item = StateRef>,
    ) -> Self {
        Self {
            consumed: consumed.into_iter().collect(),
            produced: produced.into_iter().collect(),
        }
    }
}

struct PendingWaiter {
    remaining: HashSet<StateRef>,
    notify: oneshot::Sender<()>,
}

#[derive(Default)]
struct FeedState {
    /// States reported consumed and not yet forgotten.
    consumed: HashSet<StateRef>,
    /// State -> ids of waiters still waiting on it.
    index: HashMap<StateRef, HashSet<u64>>,
    waiters: HashMap<u64, PendingWaiter>,
    next_id: u64,
}

impl FeedState {
    fn deregister(&mut self, id: u64) {
        let Some(waiter) = self.waiters.remove(&id) else {
            return;
        };
        for state in &waiter.remaining {
            if let Some(ids) = self.index.get_mut(state) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.index.remove(state);
                }
            }
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared, in-process source of state-update notifications.
pub struct InMemoryVaultFeed {
    state: Arc<Mutex<FeedState>>,
    shutdown: CancellationToken,
}

impl InMemoryVaultFeed {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Records a notarised transaction and wakes every waiter whose states
    /// have now all been consumed.
    ///
    /// Returns the number of waiters woken.
    pub fn publish(&self, update: VaultUpdate) -> usize {
        let mut state = lock(&self.state);
        let mut woken = 0;

        for consumed in &update.consumed {
            state.consumed.insert(*consumed);

            let Some(ids) = state.index.remove(consumed) else {
                continue;
            };
            for id in ids {
                let satisfied = match state.waiters.get_mut(&id) {
                    Some(waiter) => {
                        waiter.remaining.remove(consumed);
                        waiter.remaining.is_empty()
                    }
                    None => false,
                };
                if satisfied {
                    if let Some(waiter) = state.waiters.remove(&id) {
                        // Receiver may already be gone; nothing to wake then
                        if waiter.notify.send(()).is_ok() {
                            woken += 1;
                        }
                    }
                }
            }
        }

        debug!(
            consumed = update.consumed.len(),
            produced = update.produced.len(),
            woken,
            pending = state.waiters.len(),
            "Published vault update"
        );
        woken
    }

    /// Returns true if `state` has been reported consumed.
    pub fn is_consumed(&self, state: &StateRef) -> bool {
        lock(&self.state).consumed.contains(state)
    }

    /// Drops `states` from the consumed set and returns how many were
    /// removed.
    ///
    /// The consumed set grows with every published update. Callers that know
    /// no flow can still be waiting on a state (for example once its
    /// successor is itself consumed) can prune it here. A later subscription
    /// to a forgotten state waits for a new update instead of resolving at
    /// once.
    pub fn forget_consumed<'a>(&self, states: impl IntoIterator<Item = &'a StateRef>) -> usize {
        let mut state = lock(&self.state);
        states
            .into_iter()
            .filter(|s| state.consumed.remove(*s))
            .count()
    }

    /// Number of states currently remembered as consumed.
    pub fn consumed_count(&self) -> usize {
        lock(&self.state).consumed.len()
    }

    /// Number of subscriptions still waiting.
    pub fn waiter_count(&self) -> usize {
        lock(&self.state).waiters.len()
    }

    /// Stops the feed. Pending and future subscriptions resolve as cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut state = lock(&self.state);
        let pending = state.waiters.len();
        state.waiters.clear();
        state.index.clear();
        debug!(pending, "Vault feed shut down");
    }

    /// Token cancelled when the feed shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for InMemoryVaultFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StateUpdateSource for InMemoryVaultFeed {
    fn subscribe(&self, refs: BTreeSet<StateRef>) -> Result<StateSubscription, WaitError> {
        if self.shutdown.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        let mut state = lock(&self.state);
        let remaining: HashSet<StateRef> = refs
            .into_iter()
            .filter(|r| !state.consumed.contains(r))
            .collect();

        if remaining.is_empty() {
            trace!("All requested states already consumed");
            return Ok(StateSubscription::resolved());
        }

        let id = state.next_id;
        state.next_id += 1;
        for r in &remaining {
            state.index.entry(*r).or_default().insert(id);
        }

        let (notify, ready) = oneshot::channel();
        trace!(id, remaining = remaining.len(), "Registered waiter");
        state.waiters.insert(id, PendingWaiter { remaining, notify });
        drop(state);

        let feed: Weak<Mutex<FeedState>> = Arc::downgrade(&self.state);
        Ok(StateSubscription::new(
            ready,
            self.shutdown.clone(),
            move || {
                if let Some(state) = feed.upgrade() {
                    lock(&state).deregister(id);
                }
            },
        ))
    }
}

//! Observable progress of a retry executor.
//!
//! The tracker is written only by the executor and read by monitoring code.
//! Nothing in the executor ever reads it back, so it cannot influence
//! control flow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Coarse-grained steps reported while a flow is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressStep {
    /// Running the flow.
    Attempting,
    /// A reference conflict occurred; waiting for states to update.
    Retrying,
    /// The flow completed. Terminal.
    Success,
}

impl ProgressStep {
    /// All steps in the order they are normally reached.
    pub const ALL: [ProgressStep; 3] = [
        ProgressStep::Attempting,
        ProgressStep::Retrying,
        ProgressStep::Success,
    ];

    /// Human-readable label for UIs.
    pub fn label(self) -> &'static str {
        match self {
            ProgressStep::Attempting => "Attempting to run flow",
            ProgressStep::Retrying => "Reference states are out of date, waiting for updates",
            ProgressStep::Success => "Flow completed",
        }
    }
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Default)]
struct TrackerState {
    current: Option<ProgressStep>,
    history: Vec<ProgressStep>,
}

/// Records and broadcasts [`ProgressStep`] transitions.
///
/// Advancing to the step the tracker is already in is a no-op, so repeated
/// conflicts produce a single `Retrying` event. Once `Success` is reached
/// the tracker ignores further advances until [`restart`](Self::restart)
/// begins a new run.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    events: broadcast::Sender<ProgressStep>,
}

impl ProgressTracker {
    /// Number of undelivered events a slow subscriber may lag behind by.
    const CHANNEL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        let (events, _) = broadcast::channel(Self::CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(TrackerState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the tracker to `step`.
    ///
    /// Returns true if a transition was recorded, false if the tracker was
    /// already at `step` or has already reached `Success`.
    pub fn advance(&self, step: ProgressStep) -> bool {
        let mut state = self.state();
        if state.current == Some(step) || state.current == Some(ProgressStep::Success) {
            return false;
        }

        state.current = Some(step);
        state.history.push(step);
        // No receivers is fine: observation is optional
        let _ = self.events.send(step);
        true
    }

    /// Starts a new run: forgets earlier transitions and records
    /// `Attempting`.
    ///
    /// Subscribers stay attached and receive the new `Attempting` event.
    pub fn restart(&self) {
        let mut state = self.state();
        state.current = Some(ProgressStep::Attempting);
        state.history.clear();
        state.history.push(ProgressStep::Attempting);
        let _ = self.events.send(ProgressStep::Attempting);
    }

    /// The most recent step, or `None` before the executor starts.
    pub fn current(&self) -> Option<ProgressStep> {
        self.state().current
    }

    /// Every transition recorded so far, oldest first.
    pub fn history(&self) -> Vec<ProgressStep> {
        self.state().history.clone()
    }

    /// Subscribes to transitions made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressStep> {
        self.events.subscribe()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current", &self.current())
            .finish()
    }
}

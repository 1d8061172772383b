// =============================================================================
// REFERENCE CONFLICT RETRY LIMITS
// =============================================================================
//
// A flow that loses a race on a reference state is retried until the vault
// has caught up. By default there is no limit: reference data is assumed to
// become consistent eventually. Two knobs exist for operators who cannot
// make that assumption:
//
// 1. RETRY CEILING: `RetryCeiling { max_attempts, max_elapsed }`
//    - Caps how many attempts are made and/or how long the executor keeps
//      going. Exhaustion surfaces the last conflict as a fatal error.
//
// 2. EMPTY CONFLICT POLICY: `EmptyConflictPolicy`
//    - Decides what happens when a notary conflict names only states that
//      were spent as inputs, leaving nothing to wait for.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bounds on how long a flow keeps retrying reference conflicts.
///
/// # Examples
///
/// ```
/// use palin::core::RetryCeiling;
/// use std::time::Duration;
///
/// // No limit at all (the default)
/// let unbounded = RetryCeiling::UNBOUNDED;
/// assert!(!unbounded.is_exhausted(1_000, Duration::from_secs(3_600)));
///
/// // At most five attempts
/// let five = RetryCeiling::attempts(5);
/// assert!(five.is_exhausted(5, Duration::ZERO));
///
/// // Give up after a minute
/// let minute = RetryCeiling::within(Duration::from_secs(60));
/// assert!(minute.is_exhausted(2, Duration::from_secs(61)));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCeiling {
    /// Maximum number of attempts, counting the first one.
    ///
    /// Default: None (unbounded)
    pub max_attempts: Option<u32>,

    /// Maximum time since the executor started after which no further
    /// attempt is made.
    ///
    /// Default: None (unbounded)
    pub max_elapsed: Option<Duration>,
}

impl RetryCeiling {
    /// Retry for as long as conflicts keep being resolved.
    pub const UNBOUNDED: Self = Self {
        max_attempts: None,
        max_elapsed: None,
    };

    /// Allow at most `max_attempts` attempts in total.
    pub const fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            max_elapsed: None,
        }
    }

    /// Stop retrying once `max_elapsed` has passed.
    pub const fn within(max_elapsed: Duration) -> Self {
        Self {
            max_attempts: None,
            max_elapsed: Some(max_elapsed),
        }
    }

    /// Adds a time bound to an existing ceiling.
    pub const fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Returns true if no further attempt may start.
    ///
    /// # Arguments
    ///
    /// * `attempts` - Attempts already made (1-indexed: 1 after the first try)
    /// * `elapsed` - Time since the executor started
    pub fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        let attempts_spent = self.max_attempts.is_some_and(|max| attempts >= max);
        let time_spent = self.max_elapsed.is_some_and(|max| elapsed >= max);
        attempts_spent || time_spent
    }

    /// Returns true if neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_elapsed.is_none()
    }
}

/// What to do with a notary conflict in which no state was reference-only.
///
/// Such a conflict leaves nothing to wait for. Waiting on an empty set would
/// return at once and turn the executor into a tight retry loop, so the
/// default is to treat it like any other conflict on spent inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyConflictPolicy {
    /// Return the notary error to the caller unchanged.
    #[default]
    Propagate,
    /// Sleep for the given delay, then run the flow again.
    RetryAfter(Duration),
}

//! The reference-state retry executor.
//!
//! [`RetryExecutor`] runs a flow and, whenever the notary rejects it because
//! a reference state was out of date, waits for the vault to catch up and
//! runs a fresh instance of the flow. Every other failure is handed back to
//! the caller unchanged.
//!
//! The loop moves through two phases, `Attempting` and `Waiting`. When a
//! [`CheckpointStore`] is configured, each phase change is saved so that a
//! restarted node can pick the loop up where it stopped.

use super::classify::{classify, Classification};
use super::error::{ExecutionError, FlowFailure, Result};
use super::flow::Flow;
use super::progress::{ProgressStep, ProgressTracker};
use super::report::{ChainHashCodeDeriver, ErrorCodeDeriver};
use super::waiter::UpdateWaiter;
use crate::core::{EmptyConflictPolicy, RetryCeiling, StateRef};
use crate::storage::{CheckpointStore, RetryCheckpoint, RetryPhase};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, field, info, info_span, warn, Instrument};
use uuid::Uuid;

struct Checkpointing {
    store: Arc<dyn CheckpointStore>,
    flow_id: Uuid,
}

/// Runs a flow, retrying it while it fails on stale reference states.
///
/// # Example
///
/// ```no_run
/// use palin::executor::{FlowFailure, RetryExecutor, VaultUpdateWaiter};
/// use palin::storage::InMemoryVaultFeed;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let feed = Arc::new(InMemoryVaultFeed::new());
/// let executor = RetryExecutor::new(VaultUpdateWaiter::new(feed)).with_name("issue_token");
///
/// let receipt = executor
///     .execute(|| async { Ok::<_, FlowFailure>("signed") })
///     .await?;
/// assert_eq!(receipt, "signed");
/// # Ok(())
/// # }
/// ```
pub struct RetryExecutor<W> {
    waiter: W,
    tracker: Arc<ProgressTracker>,
    ceiling: RetryCeiling,
    empty_policy: EmptyConflictPolicy,
    checkpoints: Option<Checkpointing>,
    error_codes: Arc<dyn ErrorCodeDeriver>,
    name: String,
}

impl<W: UpdateWaiter> RetryExecutor<W> {
    /// Creates an executor with no retry ceiling and a private tracker.
    pub fn new(waiter: W) -> Self {
        Self {
            waiter,
            tracker: Arc::new(ProgressTracker::new()),
            ceiling: RetryCeiling::UNBOUNDED,
            empty_policy: EmptyConflictPolicy::default(),
            checkpoints: None,
            error_codes: Arc::new(ChainHashCodeDeriver::default()),
            name: "flow".to_string(),
        }
    }

    /// Reports progress to `tracker` instead of a private one.
    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Stops retrying once `ceiling` is reached.
    pub fn with_ceiling(mut self, ceiling: RetryCeiling) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Sets how conflicts with no reference-only states are handled.
    pub fn with_empty_conflict_policy(mut self, policy: EmptyConflictPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Saves the loop's phase to `store` under `flow_id`, and resumes from
    /// a checkpoint already stored there.
    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>, flow_id: Uuid) -> Self {
        self.checkpoints = Some(Checkpointing { store, flow_id });
        self
    }

    /// Derives error codes for fatal failures with `deriver`.
    pub fn with_error_codes(mut self, deriver: Arc<dyn ErrorCodeDeriver>) -> Self {
        self.error_codes = deriver;
        self
    }

    /// Name recorded on this executor's spans and log lines.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a flow from `factory` until it succeeds or fails for a reason
    /// other than stale reference states.
    ///
    /// `factory` is called once per attempt; each attempt runs a fresh flow.
    /// Every call starts a new run on the tracker, so an executor can be
    /// reused and its tracker always describes the latest run.
    ///
    /// # Errors
    /// - `ExecutionError::Flow` with the flow's error unchanged if it is not
    ///   a reference conflict
    /// - `ExecutionError::Unrelated` if the flow raised an unrelated error
    /// - `ExecutionError::RetriesExhausted` if a ceiling was configured and
    ///   reached
    /// - `ExecutionError::Cancelled` or `ExecutionError::Source` if waiting
    ///   for updates failed
    pub async fn execute<F, Fl>(&self, factory: F) -> Result<Fl::Output>
    where
        F: FnMut() -> Fl,
        Fl: Flow,
    {
        self.execute_with_cancellation(factory, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but stops with
    /// `ExecutionError::Cancelled` as soon as `cancel` fires, interrupting
    /// either a pending wait or the running attempt.
    ///
    /// A checkpoint, if configured, is kept on cancellation.
    pub async fn execute_with_cancellation<F, Fl>(
        &self,
        mut factory: F,
        cancel: CancellationToken,
    ) -> Result<Fl::Output>
    where
        F: FnMut() -> Fl,
        Fl: Flow,
    {
        let span = info_span!(
            "reference_retry",
            flow = %self.name,
            flow.id = field::Empty,
            attempts = field::Empty,
        );
        if let Some(checkpoints) = &self.checkpoints {
            span.record("flow.id", field::display(checkpoints.flow_id));
        }

        self.run(&mut factory, &cancel).instrument(span).await
    }

    async fn run<F, Fl>(&self, factory: &mut F, cancel: &CancellationToken) -> Result<Fl::Output>
    where
        F: FnMut() -> Fl,
        Fl: Flow,
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        self.tracker.restart();

        if let Some(checkpoint) = self.load_checkpoint().await? {
            attempts = checkpoint.attempt;
            match checkpoint.phase {
                RetryPhase::Waiting { refs } => {
                    info!(attempts, refs = refs.len(), "Resuming suspended retry");
                    self.tracker.advance(ProgressStep::Retrying);
                    self.suspend(&refs, cancel).await?;
                    self.save_checkpoint(|id| RetryCheckpoint::attempting(id, attempts))
                        .await?;
                }
                RetryPhase::Attempting => {
                    info!(attempts, "Resuming retry at next attempt");
                }
            }
        }

        loop {
            if cancel.is_cancelled() {
                info!(attempts, "Retry cancelled before next attempt");
                return Err(ExecutionError::Cancelled);
            }

            let flow = factory();
            attempts += 1;
            tracing::Span::current().record("attempts", attempts);
            debug!(attempt = attempts, "Running flow");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempt = attempts, "Retry cancelled during attempt");
                    return Err(ExecutionError::Cancelled);
                }
                outcome = flow.call().instrument(debug_span!("attempt", attempt = attempts)) => outcome,
            };

            let result = match outcome {
                Ok(value) => Ok(value),
                Err(FlowFailure::Flow(error)) => Err(error),
                Err(FlowFailure::Unrelated(error)) => {
                    debug!(attempt = attempts, error = %error, "Unrelated failure, propagating");
                    self.clear_checkpoint().await;
                    return Err(ExecutionError::Unrelated(error));
                }
            };

            let (refs, error) = match classify(result) {
                Classification::Success(value) => {
                    self.tracker.advance(ProgressStep::Success);
                    self.clear_checkpoint().await;
                    info!(attempts, "Flow completed");
                    return Ok(value);
                }
                Classification::Fatal(error) => {
                    let error_code = self.error_codes.derive(&error);
                    warn!(attempt = attempts, error_code = %error_code, error = %error, "Flow failed");
                    self.clear_checkpoint().await;
                    return Err(ExecutionError::Flow(error));
                }
                Classification::ReferenceConflict { refs, error } => (refs, error),
            };

            if refs.is_empty() && self.empty_policy == EmptyConflictPolicy::Propagate {
                let error_code = self.error_codes.derive(&error);
                warn!(
                    attempt = attempts,
                    error_code = %error_code,
                    error = %error,
                    "Conflict on spent inputs only, nothing to wait for"
                );
                self.clear_checkpoint().await;
                return Err(ExecutionError::Flow(error));
            }

            let elapsed = started.elapsed();
            if self.ceiling.is_exhausted(attempts, elapsed) {
                warn!(attempts, ?elapsed, "Retry ceiling reached");
                self.clear_checkpoint().await;
                return Err(ExecutionError::RetriesExhausted {
                    attempts,
                    elapsed,
                    source: error,
                });
            }

            self.tracker.advance(ProgressStep::Retrying);
            info!(
                attempt = attempts,
                refs = refs.len(),
                "Reference states out of date, waiting for updates"
            );
            self.save_checkpoint(|id| RetryCheckpoint::waiting(id, attempts, refs.clone()))
                .await?;

            self.suspend(&refs, cancel).await?;

            self.save_checkpoint(|id| RetryCheckpoint::attempting(id, attempts))
                .await?;
        }
    }

    /// Suspends until the next attempt may run.
    ///
    /// An empty set has nothing to wait for, so `RetryAfter` sleeps instead.
    /// This also holds when resuming from a `Waiting` checkpoint.
    async fn suspend(&self, refs: &BTreeSet<StateRef>, cancel: &CancellationToken) -> Result<()> {
        match self.empty_policy {
            EmptyConflictPolicy::RetryAfter(delay) if refs.is_empty() => {
                self.pause(delay, cancel).await
            }
            _ => self.wait(refs, cancel).await,
        }
    }

    async fn wait(&self, refs: &BTreeSet<StateRef>, cancel: &CancellationToken) -> Result<()> {
        let refs_display: Vec<String> = refs.iter().map(ToString::to_string).collect();
        debug!(refs = ?refs_display, "Waiting for state updates");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Retry cancelled while waiting for state updates");
                Err(ExecutionError::Cancelled)
            }
            result = self.waiter.wait_for_update(refs) => result.map_err(ExecutionError::from),
        }
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        debug!(?delay, "No reference states to wait for, retrying after delay");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn load_checkpoint(&self) -> Result<Option<RetryCheckpoint>> {
        match &self.checkpoints {
            Some(c) => Ok(c.store.load(c.flow_id).await?),
            None => Ok(None),
        }
    }

    async fn save_checkpoint(&self, make: impl FnOnce(Uuid) -> RetryCheckpoint) -> Result<()> {
        if let Some(c) = &self.checkpoints {
            c.store.save(&make(c.flow_id)).await?;
        }
        Ok(())
    }

    // Best effort: the outcome is already decided and must reach the caller
    async fn clear_checkpoint(&self) {
        if let Some(c) = &self.checkpoints {
            if let Err(e) = c.store.remove(c.flow_id).await {
                warn!(flow.id = %c.flow_id, error = %e, "Failed to remove retry checkpoint");
            }
        }
    }
}

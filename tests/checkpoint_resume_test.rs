//! Resuming retries from stored checkpoints
//!
//! This test verifies that:
//! 1. A cancelled retry leaves a `Waiting` checkpoint behind
//! 2. A new executor resumes by waiting first, then continues the attempt count
//! 3. Terminal outcomes remove the checkpoint
//! 4. A resumed delayed retry still waits out its delay

use palin::prelude::*;
use palin::storage::VaultUpdate;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn stale_state() -> StateRef {
    StateRef::new(SecureHash::new([42; 32]), 3)
}

/// Factory whose flows conflict on `state` until the feed has seen it consumed.
fn until_consumed(
    feed: Arc<InMemoryVaultFeed>,
    state: StateRef,
    calls: Arc<AtomicU32>,
) -> impl FnMut() -> std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<&'static str, FlowFailure>> + Send>,
> {
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let consumed = feed.is_consumed(&state);
        Box::pin(async move {
            if consumed {
                Ok("done")
            } else {
                Err(FlowFailure::from(NotaryException::conflict(
                    SecureHash::new([7; 32]),
                    [(state, StateConsumptionDetails::reference(SecureHash::new([8; 32])))],
                )))
            }
        })
    }
}

#[tokio::test]
async fn test_cancelled_retry_resumes_from_waiting_checkpoint() {
    let feed = Arc::new(InMemoryVaultFeed::new());
    let store = Arc::new(InMemoryCheckpointStore::new());
    let flow_id = Uuid::new_v4();
    let state = stale_state();

    // First run: conflicts, suspends, then the node "stops"
    let first_calls = Arc::new(AtomicU32::new(0));
    let first = RetryExecutor::new(VaultUpdateWaiter::new(feed.clone()))
        .with_checkpoints(store.clone(), flow_id);
    let cancel = CancellationToken::new();
    {
        let feed = feed.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while feed.waiter_count() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            cancel.cancel();
        });
    }

    let error = first
        .execute_with_cancellation(
            until_consumed(feed.clone(), state, first_calls.clone()),
            cancel,
        )
        .await
        .unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);

    let checkpoint = store.load(flow_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.attempt, 1);
    assert_eq!(
        checkpoint.phase,
        RetryPhase::Waiting {
            refs: BTreeSet::from([state])
        }
    );

    // The vault catches up while nothing is running
    feed.publish(VaultUpdate::new([state], []));

    // Second run: waits first (already satisfied), then runs attempt 2
    let second_calls = Arc::new(AtomicU32::new(0));
    let second = RetryExecutor::new(VaultUpdateWaiter::new(feed.clone()))
        .with_checkpoints(store.clone(), flow_id)
        .with_ceiling(RetryCeiling::attempts(2));

    let result = second
        .execute(until_consumed(feed.clone(), state, second_calls.clone()))
        .await
        .unwrap();

    assert_eq!(result, "done");
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        second.tracker().history(),
        vec![
            ProgressStep::Attempting,
            ProgressStep::Retrying,
            ProgressStep::Success
        ]
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_resumed_attempt_count_counts_toward_ceiling() {
    let feed = Arc::new(InMemoryVaultFeed::new());
    let store = Arc::new(InMemoryCheckpointStore::new());
    let flow_id = Uuid::new_v4();

    store
        .save(&RetryCheckpoint::attempting(flow_id, 4))
        .await
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let executor = RetryExecutor::new(VaultUpdateWaiter::new(feed.clone()))
        .with_checkpoints(store.clone(), flow_id)
        .with_ceiling(RetryCeiling::attempts(5));

    let error = executor
        .execute(until_consumed(feed, stale_state(), calls.clone()))
        .await
        .unwrap_err();

    match error {
        ExecutionError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.load(flow_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fatal_outcome_removes_checkpoint() {
    let feed = Arc::new(InMemoryVaultFeed::new());
    let store = Arc::new(InMemoryCheckpointStore::new());
    let flow_id = Uuid::new_v4();
    store
        .save(&RetryCheckpoint::attempting(flow_id, 1))
        .await
        .unwrap();

    let executor = RetryExecutor::new(VaultUpdateWaiter::new(feed))
        .with_checkpoints(store.clone(), flow_id);

    let error = executor
        .execute(|| async {
            Err::<(), _>(FlowFailure::from(NotaryException::new(
                NotaryError::WrongNotary,
                None,
            )))
        })
        .await
        .unwrap_err();

    assert!(matches!(error.flow_error(), Some(FlowError::Notary(_))));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_from_empty_wait_honours_retry_delay() {
    let feed = Arc::new(InMemoryVaultFeed::new());
    let store = Arc::new(InMemoryCheckpointStore::new());
    let flow_id = Uuid::new_v4();
    store
        .save(&RetryCheckpoint::waiting(flow_id, 1, BTreeSet::new()))
        .await
        .unwrap();

    let delay = Duration::from_millis(500);
    let executor = RetryExecutor::new(VaultUpdateWaiter::new(feed))
        .with_checkpoints(store.clone(), flow_id)
        .with_empty_conflict_policy(EmptyConflictPolicy::RetryAfter(delay));

    let started = tokio::time::Instant::now();
    let result = executor
        .execute(|| async { Ok::<_, FlowFailure>("priced") })
        .await
        .unwrap();

    assert_eq!(result, "priced");
    assert!(
        started.elapsed() >= delay,
        "resumed retry ran before the configured delay"
    );
    assert!(store.is_empty());
}

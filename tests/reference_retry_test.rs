//! End-to-end reference conflict retries against the in-memory vault feed
//!
//! This test verifies that:
//! 1. A flow rejected on a stale reference state is rerun once the vault catches up
//! 2. Shutting the feed down cancels a suspended retry
//! 3. Many executors can wait on one feed without waking each other
//! 4. Flows can be plain structs implementing `Flow`

use async_trait::async_trait;
use palin::prelude::*;
use palin::storage::VaultUpdate;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A vault that lags behind the notary.
///
/// The notary learns about spent states immediately; the vault only learns
/// about them when an update is published to the feed.
struct Ledger {
    current: Mutex<StateRef>,
    notary_spent: Mutex<HashSet<StateRef>>,
    feed: Arc<InMemoryVaultFeed>,
}

impl Ledger {
    fn new(initial: StateRef) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial),
            notary_spent: Mutex::new(HashSet::new()),
            feed: Arc::new(InMemoryVaultFeed::new()),
        })
    }

    fn read_reference(&self) -> StateRef {
        *self.current.lock().unwrap()
    }

    /// Someone else supersedes the reference state; only the notary knows yet.
    fn supersede_at_notary(&self, old: StateRef) {
        self.notary_spent.lock().unwrap().insert(old);
    }

    /// The vault records the new version and publishes the update.
    fn sync_vault(&self, old: StateRef, new: StateRef) -> usize {
        *self.current.lock().unwrap() = new;
        self.feed.publish(VaultUpdate::new([old], [new]))
    }

    fn notarise(&self, reference: StateRef) -> Result<StateRef, NotaryException> {
        if self.notary_spent.lock().unwrap().contains(&reference) {
            return Err(NotaryException::conflict(
                hash(99),
                [(reference, StateConsumptionDetails::reference(hash(98)))],
            ));
        }
        Ok(reference)
    }
}

fn hash(n: u8) -> SecureHash {
    SecureHash::new([n; 32])
}

/// Flow that reads the current reference state and notarises against it.
struct UseReferenceFlow {
    ledger: Arc<Ledger>,
}

#[async_trait]
impl Flow for UseReferenceFlow {
    type Output = StateRef;

    async fn call(self) -> Result<StateRef, FlowFailure> {
        let reference = self.ledger.read_reference();
        Ok(self.ledger.notarise(reference)?)
    }
}

async fn wait_for_waiters(feed: &InMemoryVaultFeed, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while feed.waiter_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("executors should suspend on the feed");
}

#[tokio::test]
async fn test_stale_reference_is_retried_after_vault_update() {
    let old = StateRef::new(hash(1), 0);
    let new = StateRef::new(hash(2), 0);
    let ledger = Ledger::new(old);
    ledger.supersede_at_notary(old);

    let calls = Arc::new(AtomicU32::new(0));
    let executor = RetryExecutor::new(VaultUpdateWaiter::new(ledger.feed.clone()))
        .with_name("use_reference");
    let mut progress = executor.tracker().subscribe();

    let syncer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            wait_for_waiters(&ledger.feed, 1).await;
            ledger.sync_vault(old, new)
        })
    };

    let factory_ledger = ledger.clone();
    let counter = calls.clone();
    let result = executor
        .execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            UseReferenceFlow {
                ledger: factory_ledger.clone(),
            }
        })
        .await
        .unwrap();

    assert_eq!(result, new);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(syncer.await.unwrap(), 1, "exactly one waiter woken");

    assert_eq!(progress.recv().await.unwrap(), ProgressStep::Attempting);
    assert_eq!(progress.recv().await.unwrap(), ProgressStep::Retrying);
    assert_eq!(progress.recv().await.unwrap(), ProgressStep::Success);
}

#[tokio::test]
async fn test_feed_shutdown_cancels_suspended_retry() {
    let old = StateRef::new(hash(1), 0);
    let ledger = Ledger::new(old);
    ledger.supersede_at_notary(old);

    let executor = RetryExecutor::new(VaultUpdateWaiter::new(ledger.feed.clone()));

    let feed = ledger.feed.clone();
    tokio::spawn(async move {
        wait_for_waiters(&feed, 1).await;
        feed.shutdown();
    });

    let factory_ledger = ledger.clone();
    let error = executor
        .execute(move || UseReferenceFlow {
            ledger: factory_ledger.clone(),
        })
        .await
        .unwrap_err();

    assert!(error.is_cancelled());
    assert_eq!(executor.tracker().current(), Some(ProgressStep::Retrying));
}

#[tokio::test]
async fn test_executors_sharing_a_feed_do_not_cross_talk() {
    let feed = Arc::new(InMemoryVaultFeed::new());
    let states: Vec<StateRef> = (0..4).map(|i| StateRef::new(hash(10 + i), 0)).collect();

    let mut handles = Vec::new();
    for (i, state) in states.iter().copied().enumerate() {
        let feed = feed.clone();
        let executor = RetryExecutor::new(VaultUpdateWaiter::new(feed.clone()));
        handles.push(tokio::spawn(async move {
            executor
                .execute(move || {
                    let consumed = feed.is_consumed(&state);
                    async move {
                        if consumed {
                            Ok(i)
                        } else {
                            Err(FlowFailure::from(NotaryException::conflict(
                                hash(99),
                                [(state, StateConsumptionDetails::reference(hash(98)))],
                            )))
                        }
                    }
                })
                .await
        }));
    }

    wait_for_waiters(&feed, 4).await;

    assert_eq!(
        feed.publish(VaultUpdate::new([states[0], states[1]], [])),
        2
    );
    let first = handles.remove(0).await.unwrap().unwrap();
    let second = handles.remove(0).await.unwrap().unwrap();
    assert_eq!((first, second), (0, 1));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handles.iter().all(|h| !h.is_finished()));
    assert_eq!(feed.waiter_count(), 2);

    feed.publish(VaultUpdate::new([states[2], states[3]], []));
    for (expected, handle) in (2..).zip(handles) {
        assert_eq!(handle.await.unwrap().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_timeout_composes_around_execute() {
    let old = StateRef::new(hash(1), 0);
    let ledger = Ledger::new(old);
    ledger.supersede_at_notary(old);

    let executor = RetryExecutor::new(VaultUpdateWaiter::new(ledger.feed.clone()));
    let factory_ledger = ledger.clone();

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        executor.execute(move || UseReferenceFlow {
            ledger: factory_ledger.clone(),
        }),
    )
    .await;

    assert!(outcome.is_err(), "vault never caught up, so the retry never ends");
    assert_eq!(ledger.feed.waiter_count(), 0, "timed-out wait deregisters");
}

//! Reference State Retry Demo
//!
//! This example demonstrates:
//! - A flow rejected by the notary because its reference state went stale
//! - The executor suspending on the vault feed instead of polling
//! - Progress events streamed from the tracker
//! - A non-conflict notary error passing straight through with an error code
//!
//! ## Scenario
//! A pricing flow reads the current exchange-rate state and uses it as a
//! reference in a trade. Meanwhile the rate issuer publishes a new rate. The
//! notary already knows the old rate is superseded, but the local vault only
//! catches up 200ms later. The executor waits for that update and reruns the
//! flow, which then picks up the new rate.
//!
//! ## Run with
//! ```bash
//! cargo run --example reference_retry
//!
//! # With attempt spans and subscription details
//! RUST_LOG=palin=debug cargo run --example reference_retry
//! ```

use palin::prelude::*;
use palin::storage::VaultUpdate;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct RateOracle {
    current: Mutex<StateRef>,
    spent: Mutex<HashSet<StateRef>>,
    feed: Arc<InMemoryVaultFeed>,
}

impl RateOracle {
    fn vault_rate(&self) -> StateRef {
        *self.current.lock().unwrap()
    }

    fn notarise_trade(&self, rate: StateRef) -> Result<String, NotaryException> {
        if self.spent.lock().unwrap().contains(&rate) {
            return Err(NotaryException::conflict(
                SecureHash::random(),
                [(rate, StateConsumptionDetails::reference(SecureHash::random()))],
            ));
        }
        Ok(format!("trade priced against {}", rate))
    }

    fn issue_new_rate(&self, old: StateRef, new: StateRef) {
        self.spent.lock().unwrap().insert(old);
        info!(%old, %new, "Rate issuer superseded the rate (notary knows, vault does not yet)");
    }

    fn sync_vault(&self, old: StateRef, new: StateRef) {
        *self.current.lock().unwrap() = new;
        let woken = self.feed.publish(VaultUpdate::new([old], [new]));
        info!(woken, "Vault caught up");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let old_rate = StateRef::new(SecureHash::random(), 0);
    let new_rate = StateRef::new(SecureHash::random(), 0);
    let oracle = Arc::new(RateOracle {
        current: Mutex::new(old_rate),
        spent: Mutex::new(HashSet::new()),
        feed: Arc::new(InMemoryVaultFeed::new()),
    });

    // =========================================================================
    // Part 1: stale reference, retried after the vault catches up
    // =========================================================================

    let executor = RetryExecutor::new(VaultUpdateWaiter::new(oracle.feed.clone()))
        .with_name("price_trade");

    let mut progress = executor.tracker().subscribe();
    tokio::spawn(async move {
        while let Ok(step) = progress.recv().await {
            info!(step = ?step, "Progress: {}", step);
        }
    });

    oracle.issue_new_rate(old_rate, new_rate);
    {
        let oracle = oracle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            oracle.sync_vault(old_rate, new_rate);
        });
    }

    let flow_oracle = oracle.clone();
    let receipt = executor
        .execute(move || {
            let oracle = flow_oracle.clone();
            async move {
                let rate = oracle.vault_rate();
                info!(%rate, "Pricing trade");
                Ok::<_, FlowFailure>(oracle.notarise_trade(rate)?)
            }
        })
        .await?;
    info!(%receipt, "Flow finished");

    // =========================================================================
    // Part 2: a notary error that is not a conflict is never retried
    // =========================================================================

    let executor = RetryExecutor::new(VaultUpdateWaiter::new(oracle.feed.clone()))
        .with_name("misrouted_trade");

    let result = executor
        .execute(|| async {
            Err::<String, _>(FlowFailure::from(NotaryException::new(
                NotaryError::WrongNotary,
                Some(SecureHash::random()),
            )))
        })
        .await;

    match result {
        Err(e) => warn!(error = %e, "Flow failed without retrying, as expected"),
        Ok(receipt) => info!(%receipt, "Unexpected success"),
    }

    oracle.feed.shutdown();
    Ok(())
}

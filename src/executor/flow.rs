//! The unit of work the retry executor runs.

use super::error::FlowFailure;
use async_trait::async_trait;
use std::future::Future;

/// One instance of a workflow, run to completion exactly once.
///
/// The executor asks its factory for a new `Flow` before every attempt and
/// consumes it, so state accumulated during a failed attempt is dropped
/// together with the instance.
///
/// Any `Future<Output = Result<T, FlowFailure>> + Send` is a `Flow`, so a
/// factory can simply return an `async` block:
///
/// ```
/// use palin::executor::{Flow, FlowFailure};
///
/// # async fn example() {
/// let flow = async { Ok::<_, FlowFailure>(42) };
/// assert_eq!(flow.call().await.unwrap(), 42);
/// # }
/// ```
///
/// Side effects a flow performs before it fails are NOT rolled back. They
/// will run again on the next attempt and must be safe to repeat.
#[async_trait]
pub trait Flow: Send {
    /// Value produced by a successful run.
    type Output: Send;

    /// Runs the flow to completion.
    async fn call(self) -> Result<Self::Output, FlowFailure>;
}

#[async_trait]
impl<Fut, T> Flow for Fut
where
    Fut: Future<Output = Result<T, FlowFailure>> + Send,
    T: Send,
{
    type Output = T;

    async fn call(self) -> Result<T, FlowFailure> {
        self.await
    }
}

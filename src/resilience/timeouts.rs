//! Timeout enforcement.
//!
//! # Responsibilities
//! - Run a guarded call on its own task under a deadline
//! - Abandon the call when the deadline wins
//! - Report panics separately from ordinary completion
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The guarded call owns its task; the caller only observes the first outcome
//! - Abandoned tasks are aborted

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};

/// Result of racing a spawned call against its deadline.
#[derive(Debug)]
pub enum DeadlineOutcome<T> {
    /// The call finished before the deadline.
    Completed(T),
    /// The call panicked; the payload can be resumed on the caller.
    Panicked(Box<dyn Any + Send + 'static>),
    /// The task was cancelled by the runtime (e.g. during shutdown).
    Cancelled,
    /// The deadline elapsed first. The task has been aborted.
    Elapsed,
}

/// Join handle that aborts its task when dropped.
///
/// Dropping it after completion is a no-op.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn `future` and wait at most `deadline` for it.
///
/// The spawned task is aborted if the deadline elapses or if the returned
/// future is itself dropped, so a late result is never observed.
pub async fn run_with_deadline<Fut>(deadline: Duration, future: Fut) -> DeadlineOutcome<Fut::Output>
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let task = AbortOnDrop(tokio::spawn(future));

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(output)) => DeadlineOutcome::Completed(output),
        Ok(Err(e)) => match e.try_into_panic() {
            Ok(payload) => DeadlineOutcome::Panicked(payload),
            Err(_) => DeadlineOutcome::Cancelled,
        },
        Err(_) => DeadlineOutcome::Elapsed,
    }
}

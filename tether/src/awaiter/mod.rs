//! The suspension protocol shared by every awaitable thing.
//!
//! A task body can suspend at exactly three kinds of points: a one-shot or
//! repeating event ([`EventAwaiter`]), a value computed elsewhere
//! ([`FutureAwaiter`]), or another task ([`TaskHandle`](crate::TaskHandle)).
//! All of them implement [`Awaitable`] and are turned into futures by
//! [`Suspension`].

use crate::context;
use crate::task::{self, Id, TaskError, TaskKey};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

mod event;
pub use event::{EventAwaiter, EventFlags};

mod future;
pub use future::{Completion, FutureAwaiter};

#[cfg(test)]
mod tests;

/// Something a task body can suspend on.
pub trait Awaitable {
    type Output;

    /// Whether [`resume`](Awaitable::resume) can be called right away. When it
    /// is, the body does not suspend at all.
    fn ready(&self) -> bool;

    /// Arranges for `continuation` to be resumed, or aborted, later.
    fn suspend(&mut self, continuation: &Continuation) -> Result<(), TaskError>;

    fn resume(&mut self) -> Result<Self::Output, TaskError>;

    /// Called when a suspended await is dropped before it resumed.
    fn cancel(&mut self, _continuation: &Continuation) {}
}

impl<A: Awaitable + ?Sized> Awaitable for &mut A {
    type Output = A::Output;

    fn ready(&self) -> bool {
        (**self).ready()
    }

    fn suspend(&mut self, continuation: &Continuation) -> Result<(), TaskError> {
        (**self).suspend(continuation)
    }

    fn resume(&mut self) -> Result<Self::Output, TaskError> {
        (**self).resume()
    }

    fn cancel(&mut self, continuation: &Continuation) {
        (**self).cancel(continuation)
    }
}

/// The suspended task, as seen by whatever it awaits.
///
/// Resuming never re-enters the task synchronously: it posts the resumption
/// to the event loop. Both operations are no-ops once the task is gone.
#[derive(Clone)]
pub struct Continuation {
    key: TaskKey,
    waker: Waker,
}

impl Continuation {
    pub(crate) fn new(key: TaskKey, waker: Waker) -> Self {
        Self { key, waker }
    }

    pub(crate) fn key(&self) -> TaskKey {
        self.key
    }

    pub fn task_id(&self) -> Id {
        self.key.id()
    }

    pub fn waker(&self) -> &Waker {
        &self.waker
    }

    pub fn resume(&self) {
        self.waker.wake_by_ref();
    }

    /// Aborts the suspended task and its whole call chain.
    pub fn abort(&self) {
        if let Some(core) = context::try_core() {
            task::abort(&core, self.key);
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("task", &self.key.id())
            .finish()
    }
}

/// Adapts an [`Awaitable`] into a [`Future`].
///
/// # Panics
///
/// Polling panics on protocol violations (see [`TaskError`]), including
/// polling it outside of a task body while it is not ready.
///
/// Dropping a suspended `Suspension` withdraws the await, see
/// [`Awaitable::cancel`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Suspension<A: Awaitable> {
    awaitable: A,

    // Set while suspended, cleared once resumed.
    continuation: Option<Continuation>,
}

impl<A: Awaitable> Suspension<A> {
    pub fn new(awaitable: A) -> Self {
        Self {
            awaitable,
            continuation: None,
        }
    }
}

impl<A: Awaitable> Drop for Suspension<A> {
    fn drop(&mut self) {
        if let Some(continuation) = self.continuation.take() {
            self.awaitable.cancel(&continuation);
        }
    }
}

impl<A: Awaitable + Unpin> Future for Suspension<A> {
    type Output = A::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.awaitable.ready() {
            this.continuation = None;
            return match this.awaitable.resume() {
                Ok(value) => Poll::Ready(value),
                Err(err) => panic!("failed to resume: {err}"),
            };
        }

        if this.continuation.is_none() {
            let Some(key) = context::current_task() else {
                panic!("failed to suspend: {}", TaskError::NoCurrentTask);
            };

            let continuation = Continuation::new(key, cx.waker().clone());
            if let Err(err) = this.awaitable.suspend(&continuation) {
                panic!("failed to suspend: {err}");
            }

            this.continuation = Some(continuation);
        }

        Poll::Pending
    }
}

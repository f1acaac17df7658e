use crate::awaiter::{Awaitable, Continuation, Suspension};
use crate::task::TaskError;
use std::future::IntoFuture;
use std::task::Waker;

/// A single-completion source of a value computed elsewhere, possibly on
/// another thread.
pub trait Completion {
    type Output;

    fn is_completed(&self) -> bool;

    /// Wakes `waker` once the source completes, or right away if it already
    /// has.
    fn on_completed(&self, waker: Waker);

    /// The completed value. Only called once [`is_completed`] returned true.
    ///
    /// [`is_completed`]: Completion::is_completed
    fn value(&self) -> Self::Output;
}

/// Suspends a task until a [`Completion`] source completes.
///
/// The source is not watched for failure: a source that never completes keeps
/// the awaiting task suspended until its owner is destroyed.
#[derive(Debug)]
pub struct FutureAwaiter<S> {
    source: S,
}

impl<S: Completion> FutureAwaiter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: Completion> Awaitable for FutureAwaiter<S> {
    type Output = S::Output;

    fn ready(&self) -> bool {
        self.source.is_completed()
    }

    fn suspend(&mut self, continuation: &Continuation) -> Result<(), TaskError> {
        // The waker is bound to the task, waking it after an abort is a no-op.
        self.source.on_completed(continuation.waker().clone());
        Ok(())
    }

    fn resume(&mut self) -> Result<S::Output, TaskError> {
        if !self.source.is_completed() {
            return Err(TaskError::NotReady);
        }
        Ok(self.source.value())
    }
}

impl<S: Completion + Unpin> IntoFuture for FutureAwaiter<S> {
    type Output = S::Output;
    type IntoFuture = Suspension<FutureAwaiter<S>>;

    fn into_future(self) -> Self::IntoFuture {
        Suspension::new(self)
    }
}

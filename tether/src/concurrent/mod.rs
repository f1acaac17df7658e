//! Values computed off the runtime thread.
//!
//! A [`Promise`] is the producing side of a single-completion value and may be
//! sent to any thread. Its [`Deferred`] is the consuming side: a task body
//! awaits it and is resumed on the runtime thread once the promise is
//! finished.

use crate::awaiter::{Completion, FutureAwaiter, Suspension};
use crate::runtime::SPILL_TO_HEAP_THRESHOLD;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::task::Waker;
use std::thread;

struct Shared<T> {
    value: Option<T>,
    finished: bool,
    wakers: SmallVec<[Waker; SPILL_TO_HEAP_THRESHOLD]>,
}

/// The producing side. Dropping an unfinished promise leaves its deferred
/// pending forever.
pub struct Promise<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                value: None,
                finished: false,
                wakers: SmallVec::new(),
            })),
        }
    }

    pub fn deferred(&self) -> Deferred<T> {
        Deferred {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stores `value` and wakes every task awaiting it.
    pub fn finish(self, value: T) {
        let wakers = {
            let mut shared = self.shared.lock();
            shared.value = Some(value);
            shared.finished = true;
            std::mem::take(&mut shared.wakers)
        };

        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("finished", &self.shared.lock().finished)
            .finish()
    }
}

/// The consuming side of a [`Promise`]. Clones observe the same value.
pub struct Deferred<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Deferred<T> {
    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }
}

impl<T: Clone> Deferred<T> {
    pub fn try_value(&self) -> Option<T> {
        self.shared.lock().value.clone()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T: Clone> Completion for Deferred<T> {
    type Output = T;

    fn is_completed(&self) -> bool {
        self.is_finished()
    }

    fn on_completed(&self, waker: Waker) {
        let mut shared = self.shared.lock();
        if shared.finished {
            drop(shared);
            waker.wake();
        } else {
            shared.wakers.push(waker);
        }
    }

    #[track_caller]
    fn value(&self) -> T {
        match self.try_value() {
            Some(value) => value,
            None => panic!("deferred value read before its promise finished"),
        }
    }
}

impl<T: Clone> IntoFuture for Deferred<T> {
    type Output = T;
    type IntoFuture = Suspension<FutureAwaiter<Deferred<T>>>;

    fn into_future(self) -> Self::IntoFuture {
        Suspension::new(FutureAwaiter::new(self))
    }
}

/// Runs `f` on a new background thread and returns the deferred result.
///
/// A panic in `f` drops the promise unfinished, see [`Promise`].
pub fn run<F, T>(f: F) -> Deferred<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let promise = Promise::new();
    let deferred = promise.deferred();

    thread::spawn(move || promise.finish(f()));

    deferred
}

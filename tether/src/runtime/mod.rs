//! The runtime: configuration, the per-thread core and its event loop.

use crate::context;

mod core;
pub(crate) use self::core::Core;

mod error;
pub use error::RuntimeError;

mod event_loop;
pub(crate) use event_loop::{EventLoop, Inbox, Runnable};

#[allow(clippy::module_inception)]
mod runtime;
pub(crate) use runtime::{RuntimeConfig, SPILL_TO_HEAP_THRESHOLD};
pub use runtime::{Builder, OnTaskPanic, Runtime};

mod timer;
pub use timer::{single_shot, single_shot_scoped};

mod waker;
pub(crate) use waker::TaskWaker;


/// Posts `callback` to run on the event loop of the current thread, after
/// everything already queued.
///
/// # Panics
///
/// Panics if there is no runtime on the current thread.
#[track_caller]
pub fn post<F>(callback: F)
where
    F: FnOnce() + 'static,
{
    context::expect_core().event_loop.post(Box::new(callback));
}

/// Makes the event loop of the current thread return from its current, or
/// next, `run*` call.
#[track_caller]
pub fn stop() {
    context::expect_core().event_loop.stop();
}

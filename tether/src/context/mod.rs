//! Thread-local runtime context.
//!
//! Holds the core of the runtime driving this thread and the key of the task
//! whose frame is currently being polled. Accessors hand out clones of the
//! `Rc<Core>` instead of references so that no thread-local borrow is ever
//! held while user code runs.

use crate::runtime::{Core, RuntimeError};
use crate::task::TaskKey;
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread_local;

thread_local! {
    static CONTEXT: RefCell<Option<Rc<Core>>> = const { RefCell::new(None) };

    static CURRENT_TASK: Cell<Option<TaskKey>> = const { Cell::new(None) };
}

pub(crate) fn init(core: Rc<Core>) {
    CONTEXT.with(|ctx| ctx.replace(Some(core)));
}

pub(crate) fn clear() -> Option<Rc<Core>> {
    CONTEXT
        .try_with(|ctx| ctx.borrow_mut().take())
        .ok()
        .flatten()
}

/// The core of the runtime active on this thread, if any. Safe to call from
/// destructors running during thread teardown.
pub(crate) fn try_core() -> Option<Rc<Core>> {
    CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok().flatten()
}

pub(crate) fn core() -> Result<Rc<Core>, RuntimeError> {
    try_core().ok_or(RuntimeError::NoRuntime)
}

#[track_caller]
pub(crate) fn expect_core() -> Rc<Core> {
    match core() {
        Ok(core) => core,
        Err(err) => panic!("{err}"),
    }
}

pub(crate) fn current_task() -> Option<TaskKey> {
    CURRENT_TASK.try_with(Cell::get).ok().flatten()
}

/// Marks `key` as the task being polled until the returned guard is dropped,
/// then restores the previously running task. Bodies may start other tasks
/// eagerly, so polls nest.
#[must_use]
pub(crate) fn enter_task(key: TaskKey) -> ScopeGuard<'static, impl FnOnce()> {
    let parent = CURRENT_TASK.with(|current| current.replace(Some(key)));
    ScopeGuard::new(move || {
        let _ = CURRENT_TASK.try_with(|current| current.set(parent));
    })
}

use crate::task::{Id, TaskError, TaskKey};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// Position of a task in its call chain.
//
// `current` is a checked, non-owning reference to the task's own controller;
// it is cleared when the task completes or is aborted. `caller` and `callee`
// form the chain: `A.callee == B` iff `B.caller == A`, except while a
// completion or an abort is unlinking them.
#[derive(Debug, Default)]
pub(crate) struct TaskLinks {
    pub(crate) current: Cell<Option<TaskKey>>,
    pub(crate) caller: Cell<Option<TaskKey>>,
    pub(crate) callee: Cell<Option<TaskKey>>,
}

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Ready(T),
    Taken,
}

/// State shared between a task's controller, its frame and every handle to
/// it. Outlives the controller for as long as a handle exists.
#[derive(Debug)]
pub(crate) struct SharedState<T> {
    id: Id,
    pub(crate) links: Rc<TaskLinks>,
    result: RefCell<Slot<T>>,
}

impl<T> SharedState<T> {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            links: Rc::new(TaskLinks::default()),
            result: RefCell::new(Slot::Empty),
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    /// Stores the body's return value. A value produced after the task got
    /// aborted, which happens when a body destroys its own owner, is dropped.
    pub(crate) fn complete(&self, value: T) {
        if self.links.current.get().is_none() {
            return;
        }

        let mut result = self.result.borrow_mut();
        if matches!(*result, Slot::Empty) {
            *result = Slot::Ready(value);
        }
    }

    /// Stays true once a value got stored, even after it was taken.
    pub(crate) fn is_ready(&self) -> bool {
        !matches!(*self.result.borrow(), Slot::Empty)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.links.current.get().is_some()
    }

    pub(crate) fn take(&self) -> Result<T, TaskError> {
        let mut result = self.result.borrow_mut();
        match std::mem::replace(&mut *result, Slot::Taken) {
            Slot::Ready(value) => Ok(value),
            Slot::Empty => {
                *result = Slot::Empty;
                Err(TaskError::NotReady)
            }
            Slot::Taken => Err(TaskError::ResultTaken),
        }
    }
}

use crate::awaiter::{Awaitable, Continuation, Suspension};
use crate::context;
use crate::task::state::SharedState;
use crate::task::{Id, TaskError};
use std::fmt;
use std::future::IntoFuture;
use std::rc::Rc;

/// A handle to a spawned task and claim to its result.
///
/// Awaiting the handle from another task body suspends that body until the
/// task completes, linking both into a call chain: if either end of the chain
/// is aborted, so is the other. Dropping every handle does not stop the task.
pub struct TaskHandle<T> {
    state: Rc<SharedState<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(state: Rc<SharedState<T>>) -> Self {
        Self { state }
    }

    pub fn id(&self) -> Id {
        self.state.id()
    }

    /// Whether the task returned a value. Once true, stays true.
    pub fn ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Whether the task has neither completed nor been aborted yet.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether the task completed or was aborted. A task spawned for an owner
    /// that was already destroyed is settled right away.
    pub fn is_settled(&self) -> bool {
        !self.is_running()
    }

    /// Extracts the result without awaiting.
    pub fn take_result(&self) -> Result<T, TaskError> {
        self.state.take()
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("ready", &self.ready())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<T> Awaitable for TaskHandle<T> {
    type Output = T;

    fn ready(&self) -> bool {
        self.state.is_ready()
    }

    fn suspend(&mut self, continuation: &Continuation) -> Result<(), TaskError> {
        let core = context::core()?;

        let caller = continuation.key();
        let tasks = core.tasks.borrow();

        // Aborted during this very poll, the frame is dropped once it returns.
        let Some(awaiting) = tasks.get(caller) else {
            return Ok(());
        };

        let awaited = self
            .state
            .links
            .current
            .get()
            .and_then(|callee| tasks.get(callee).map(|controller| (callee, controller)));
        let Some((callee, awaited)) = awaited else {
            return Err(TaskError::Detached(self.id()));
        };

        if let Some(existing) = awaited.links().caller.get() {
            return Err(TaskError::AlreadyAwaited {
                awaited: callee.id(),
                caller: existing.id(),
            });
        }

        if let Some(existing) = awaiting.links().callee.get() {
            return Err(TaskError::AlreadyAwaiting {
                caller: caller.id(),
                awaited: existing.id(),
            });
        }

        awaited.links().caller.set(Some(caller));
        awaiting.links().callee.set(Some(callee));

        Ok(())
    }

    // The awaiting body dropped this await before the task completed, e.g. the
    // losing branch of a `select`. Both tasks keep running, unlinked.
    fn cancel(&mut self, continuation: &Continuation) {
        let Some(core) = context::try_core() else {
            return;
        };

        let caller = continuation.key();
        let links = &self.state.links;
        let Some(callee) = links.current.get() else {
            return;
        };
        if links.caller.get() != Some(caller) {
            return;
        }

        links.caller.set(None);
        if let Some(awaiting) = core.tasks.borrow().get(caller)
            && awaiting.links().callee.get() == Some(callee)
        {
            awaiting.links().callee.set(None);
        }
    }

    fn resume(&mut self) -> Result<T, TaskError> {
        self.state.take()
    }
}

impl<T> IntoFuture for TaskHandle<T> {
    type Output = T;
    type IntoFuture = Suspension<TaskHandle<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Suspension::new(self)
    }
}

use crate::context;
use crate::runtime::{Core, Inbox};
use crate::task::TaskKey;
use std::sync::Arc;
use std::task::Wake;
use std::thread::{self, ThreadId};
use tracing::trace;

// Resumes one task. Waking on the runtime thread posts the resumption to the
// local queue, waking from any other thread goes through the remote inbox.
// Either way the task is polled later by the event loop, never by the waker.
pub(crate) struct TaskWaker {
    key: TaskKey,
    thread: ThreadId,
    inbox: Arc<Inbox>,
}

impl TaskWaker {
    pub(crate) fn new(key: TaskKey, core: &Core) -> Arc<Self> {
        Arc::new(Self {
            key,
            thread: core.thread_id(),
            inbox: Arc::clone(core.event_loop.inbox()),
        })
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if thread::current().id() != self.thread {
            trace!(task.id = %self.key.id(), "remote wake");
            self.inbox.push(self.key);
            return;
        }

        // No runtime means it was shut down, along with the task.
        if let Some(core) = context::try_core() {
            core.event_loop.post_resume(self.key);
        }
    }
}

use crate::runtime::{EventLoop, Runnable, RuntimeConfig, RuntimeError};
use crate::task::{self, Registry};
use crate::utils::ScopeGuard;
#[allow(unused)]
use crate::utils::tracker::{Call, Method};
#[cfg(test)]
use crate::utils::tracker::Tracker;
use std::cell::RefCell;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, warn};

/// Per-thread state of a runtime, reachable from the thread-local context.
#[derive(Debug)]
pub(crate) struct Core {
    pub(crate) cfg: RuntimeConfig,

    pub(crate) tasks: RefCell<Registry>,

    pub(crate) event_loop: EventLoop,

    thread_id: ThreadId,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Core {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        Self {
            tasks: RefCell::new(Registry::with_capacity(cfg.tasks_capacity)),
            event_loop: EventLoop::new(&cfg),
            thread_id: thread::current().id(),
            cfg,

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    // Introspection for tests, no-op in other builds.
    #[allow(unused)]
    #[inline(always)]
    pub(crate) fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }

    /// Drives the event loop until `done` returns true or the loop is stopped.
    pub(crate) fn run_until(
        self: &Rc<Self>,
        mut done: impl FnMut() -> bool,
    ) -> Result<(), RuntimeError> {
        let event_loop = &self.event_loop;
        if event_loop.running.replace(true) {
            return Err(RuntimeError::AlreadyRunning);
        }

        // Also reset when a task panics out of the loop.
        let _running = ScopeGuard::new(|| {
            event_loop.running.set(false);
            event_loop.stopped.set(false);
        });

        let mut idle_since: Option<Instant> = None;

        while !done() && !event_loop.is_stopped() {
            if let Some(runnable) = event_loop.next_runnable() {
                idle_since = None;
                self.dispatch(runnable);
                continue;
            }

            let idle_for = idle_since.get_or_insert_with(Instant::now).elapsed();
            if let Some(stall_timeout) = self.cfg.stall_timeout
                && idle_for >= stall_timeout
                && !event_loop.has_timers()
            {
                warn!(?idle_for, "event loop stalled");
                return Err(RuntimeError::Stalled(idle_for));
            }

            event_loop.park();
        }

        Ok(())
    }

    /// Runs what is ready right now: posted work, remote wakes, due timers.
    pub(crate) fn run_pending(self: &Rc<Self>) -> Result<(), RuntimeError> {
        let event_loop = &self.event_loop;
        if event_loop.running.replace(true) {
            return Err(RuntimeError::AlreadyRunning);
        }
        let _running = ScopeGuard::new(|| event_loop.running.set(false));

        while let Some(runnable) = event_loop.next_runnable() {
            self.dispatch(runnable);
        }

        Ok(())
    }

    fn dispatch(self: &Rc<Self>, runnable: Runnable) {
        match runnable {
            Runnable::Callback(callback) => callback(),
            Runnable::Resume(key) => {
                self.track(Method::Resume, Call::Resume { id: key.id() });
                task::poll(self, key);
            }
        }
    }

    /// Aborts every live task and drops whatever is still queued.
    pub(crate) fn shutdown(self: &Rc<Self>) {
        let keys = {
            let mut tasks = self.tasks.borrow_mut();
            tasks.close();
            tasks.keys()
        };

        if !keys.is_empty() {
            debug!(tasks = keys.len(), "aborting remaining tasks");
        }

        for key in keys {
            task::abort(self, key);
        }

        // Dropping queued callbacks may queue more, e.g. `delete_later`.
        loop {
            let (queue, timers) = self.event_loop.drain();
            if queue.is_empty() && timers.is_empty() {
                break;
            }
            drop(queue);
            drop(timers);
        }
    }
}

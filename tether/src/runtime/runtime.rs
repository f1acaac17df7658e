use crate::context;
use crate::object::Ownable;
use crate::runtime::{Core, RuntimeError};
use crate::task::{self, TaskHandle};
use anyhow::{Result, anyhow};
use std::cell::Cell;
use std::convert::TryFrom;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

// Used wherever we rely on SmallVec to store entries on stack first.
pub(crate) const SPILL_TO_HEAP_THRESHOLD: usize = 16;

/// Longest time an idle event loop sleeps before checking for work again.
const IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Initial capacity of the task arena and of the run queue.
const TASKS_CAPACITY: usize = 64;

/// What to do when a task body panics.
///
/// A panic escaping a body is a bug in that body: there is no error channel
/// between a task and whatever awaits it, so the runtime never tries to
/// resume anything after one.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTaskPanic {
    /// Log the panic and abort the process.
    #[default]
    Abort,

    /// Abort the panicking task and its call chain, then resume unwinding out
    /// of the runtime entry point that polled it (`spawn`, `run`, ...).
    Unwind,
}

#[derive(Debug)]
pub struct Builder {
    /// Longest time the event loop sleeps while idle, waiting for remote wakes
    /// or the next timer.
    idle_interval: Duration,

    /// Fail `run*` with [`RuntimeError::Stalled`] after being idle this long
    /// with no pending timer. Waits forever by default.
    stall_timeout: Option<Duration>,

    on_task_panic: OnTaskPanic,

    tasks_capacity: usize,
}

impl Builder {
    /// Returns a new builder for a runtime driven by the current thread.
    ///
    /// Configuration methods can be chained on the return value.
    pub fn new_local() -> Builder {
        Builder {
            idle_interval: IDLE_INTERVAL,
            stall_timeout: None,
            on_task_panic: OnTaskPanic::default(),
            tasks_capacity: TASKS_CAPACITY,
        }
    }

    #[track_caller]
    pub fn idle_interval(mut self, val: Duration) -> Self {
        assert!(!val.is_zero(), "idle_interval must be greater than 0");
        self.idle_interval = val;
        self
    }

    #[track_caller]
    pub fn stall_timeout(mut self, val: Duration) -> Self {
        assert!(!val.is_zero(), "stall_timeout must be greater than 0");
        self.stall_timeout = Some(val);
        self
    }

    pub fn on_task_panic(mut self, val: OnTaskPanic) -> Self {
        self.on_task_panic = val;
        self
    }

    #[track_caller]
    pub fn tasks_capacity(mut self, val: usize) -> Self {
        assert!(val > 0, "tasks_capacity must be greater than 0");
        self.tasks_capacity = val;
        self
    }

    /// Creates the configured `Runtime` and binds it to the current thread.
    ///
    /// Fails if another runtime is already active on this thread.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg = RuntimeConfig::try_from(self)?;

        IS_RUNTIME_ACTIVE.with(|is_active| -> Result<()> {
            if is_active.get() {
                Err(RuntimeError::AlreadyActive.into())
            } else {
                is_active.set(true);
                Ok(())
            }
        })?;

        let core = Rc::new(Core::new(cfg));
        context::init(Rc::clone(&core));

        Ok(Runtime { core })
    }
}

thread_local! {
    static IS_RUNTIME_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// A single-threaded runtime.
///
/// Tasks run on the thread that built the runtime. They make progress while
/// one of the `run*` methods drives the event loop, or eagerly when spawned.
/// Dropping the runtime aborts every task that is still alive.
pub struct Runtime {
    core: Rc<Core>,
}

impl Runtime {
    /// Spawns a task bound to `owner`. See [`tether::spawn`](crate::spawn).
    #[track_caller]
    pub fn spawn<O, F>(&self, owner: &O, body: F) -> TaskHandle<F::Output>
    where
        O: Ownable + ?Sized,
        F: Future + 'static,
        F::Output: 'static,
    {
        task::spawn(owner, body)
    }

    /// Posts `callback` to run on the event loop.
    pub fn post<F: FnOnce() + 'static>(&self, callback: F) {
        self.core.event_loop.post(Box::new(callback));
    }

    /// Drives the event loop until [`stop`](Runtime::stop) is called.
    pub fn run(&self) -> Result<()> {
        Ok(self.core.run_until(|| false)?)
    }

    /// Drives the event loop until the task of `handle` completed or was
    /// aborted, or until [`stop`](Runtime::stop) is called.
    pub fn run_until<T>(&self, handle: &TaskHandle<T>) -> Result<()> {
        Ok(self.core.run_until(|| handle.is_settled())?)
    }

    /// Runs everything that is ready now, without waiting for timers or
    /// remote wakes.
    pub fn run_pending(&self) -> Result<()> {
        Ok(self.core.run_pending()?)
    }

    /// Makes the current, or the next, `run*` call return.
    pub fn stop(&self) {
        self.core.event_loop.stop();
    }

    /// Number of tasks that neither completed nor were aborted yet.
    pub fn num_tasks(&self) -> usize {
        self.core.tasks.borrow().len()
    }

    /// Aborts every remaining task and releases the thread. Same as dropping
    /// the runtime.
    pub fn shutdown(self) {
        drop(self);
    }

    fn shutdown_inner(&self) {
        self.core.shutdown();
        context::clear();
        let _ = IS_RUNTIME_ACTIVE.try_with(|is_active| is_active.set(false));
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("tasks", &*self.core.tasks.borrow())
            .field("event_loop", &self.core.event_loop)
            .finish()
    }
}

#[cfg(test)]
impl Runtime {
    pub(crate) fn core(&self) -> &Rc<Core> {
        &self.core
    }
}

// Immutable snapshot of the builder consumed by the runtime core.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) idle_interval: Duration,
    pub(crate) stall_timeout: Option<Duration>,
    pub(crate) on_task_panic: OnTaskPanic,
    pub(crate) tasks_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            idle_interval: IDLE_INTERVAL,
            stall_timeout: None,
            on_task_panic: OnTaskPanic::default(),
            tasks_capacity: TASKS_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if let Some(stall_timeout) = self.stall_timeout
            && stall_timeout < self.idle_interval
        {
            return Err(anyhow!(
                "stall_timeout ({:?}) must not be shorter than idle_interval ({:?})",
                stall_timeout,
                self.idle_interval
            ));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = RuntimeConfig {
            idle_interval: builder.idle_interval,
            stall_timeout: builder.stall_timeout,
            on_task_panic: builder.on_task_panic,
            tasks_capacity: builder.tasks_capacity,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

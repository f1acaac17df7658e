use crate::context;
use crate::object::{Ownable, Subscription};
use crate::runtime::{Core, OnTaskPanic, TaskWaker};
use crate::task::state::{SharedState, TaskLinks};
use crate::task::{Id, TaskError, TaskHandle, TaskKey};
#[allow(unused)]
use crate::utils::tracker::{Call, Method};
use pin_project::pin_project;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker, ready};
use tracing::{debug, error, trace, warn};

pub(crate) type BoxFrame = Pin<Box<dyn Future<Output = ()>>>;

/// Owns a suspended task body.
///
/// A controller exists from spawn until its task completes or is aborted and
/// is only ever reachable through its [`TaskKey`]. `frame` is `None` while the
/// frame is being polled.
pub(crate) struct Controller {
    id: Id,

    frame: Option<BoxFrame>,

    links: Rc<TaskLinks>,

    owner_watch: Option<Subscription>,

    aborting: bool,
}

impl Controller {
    pub(crate) fn new(id: Id, frame: BoxFrame, links: Rc<TaskLinks>) -> Self {
        Self {
            id,
            frame: Some(frame),
            links,
            owner_watch: None,
            aborting: false,
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn links(&self) -> &TaskLinks {
        &self.links
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("polling", &self.frame.is_none())
            .field("links", &self.links)
            .field("aborting", &self.aborting)
            .finish()
    }
}

// Drives the user's body and publishes its return value into the shared
// state, so the boxed frame stored in the controller can be type-erased.
#[pin_project]
struct Frame<F: Future> {
    #[pin]
    body: F,
    state: Rc<SharedState<F::Output>>,
}

impl<F: Future> Future for Frame<F> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let value = ready!(this.body.poll(cx));
        this.state.complete(value);
        Poll::Ready(())
    }
}

/// Creates the controller for `body`, binds it to `owner` and runs the body
/// eagerly until its first suspension point or its end.
pub(crate) fn spawn<O, F>(
    core: &Rc<Core>,
    owner: &O,
    body: F,
) -> Result<TaskHandle<F::Output>, TaskError>
where
    O: Ownable + ?Sized,
    F: Future + 'static,
    F::Output: 'static,
{
    // Every controller lives on the runtime thread, so tasks linked by an
    // await always share it.
    if owner.thread_id() != core.thread_id() {
        return Err(TaskError::ForeignOwner);
    }

    let state = Rc::new(SharedState::new(Id::next()));
    let id = state.id();

    if !owner.is_alive() {
        warn!(task.id = %id, "owner already destroyed, task will never run");
        return Ok(TaskHandle::new(state));
    }

    let frame = Box::pin(Frame {
        body,
        state: Rc::clone(&state),
    });

    let controller = Controller::new(id, frame, Rc::clone(&state.links));
    let inserted = core.tasks.borrow_mut().insert(controller);
    let key = match inserted {
        Ok(key) => key,
        Err(controller) => {
            warn!(task.id = %id, "runtime is shutting down, task will never run");
            drop(controller);
            return Ok(TaskHandle::new(state));
        }
    };

    state.links.current.set(Some(key));

    let weak: Weak<Core> = Rc::downgrade(core);
    let watch = owner.on_destroyed(Box::new(move || {
        if let Some(core) = weak.upgrade() {
            debug!(task.id = %key.id(), "owner destroyed");
            abort(&core, key);
        }
    }));

    if let Some(controller) = core.tasks.borrow_mut().get_mut(key) {
        controller.owner_watch = Some(watch);
    }

    trace!(task.id = %id, "spawned");
    core.track(Method::Spawn, Call::Spawn { id });

    poll(core, key);

    Ok(TaskHandle::new(state))
}

/// Polls the frame of `key` once. A key whose controller is gone is a stale
/// resumption and is ignored.
pub(crate) fn poll(core: &Rc<Core>, key: TaskKey) {
    let taken = core
        .tasks
        .borrow_mut()
        .get_mut(key)
        .and_then(|controller| controller.frame.take());

    let Some(mut frame) = taken else {
        trace!(task.id = %key.id(), "stale resumption");
        return;
    };

    trace!(task.id = %key.id(), "polling");

    let waker = Waker::from(TaskWaker::new(key, core));
    let mut cx = Context::from_waker(&waker);

    let outcome = {
        let _current = context::enter_task(key);
        panic::catch_unwind(AssertUnwindSafe(|| frame.as_mut().poll(&mut cx)))
    };

    match outcome {
        Ok(Poll::Pending) => {
            let aborted = {
                let mut tasks = core.tasks.borrow_mut();
                match tasks.get_mut(key) {
                    Some(controller) => {
                        controller.frame = Some(frame);
                        None
                    }
                    None => Some(frame),
                }
            };

            // The task was aborted while its own frame was being polled.
            if let Some(frame) = aborted {
                drop(frame);
                trace!(task.id = %key.id(), "dropped frame of aborted task");
                core.track(
                    Method::Destroy,
                    Call::Destroy {
                        id: key.id(),
                        deferred: true,
                    },
                );
            }
        }
        Ok(Poll::Ready(())) => {
            drop(frame);
            if core.tasks.borrow().contains(key) {
                handle_return(core, key);
            } else {
                // Aborted during its last poll, the value was discarded.
                core.track(
                    Method::Destroy,
                    Call::Destroy {
                        id: key.id(),
                        deferred: true,
                    },
                );
            }
        }
        Err(payload) => unhandled_panic(core, key, frame, payload),
    }
}

/// Normal completion: releases the controller and posts the resumption of the
/// awaiting caller, if any.
fn handle_return(core: &Rc<Core>, key: TaskKey) {
    let Some(controller) = core.tasks.borrow_mut().remove(key) else {
        return;
    };

    controller.links.current.set(None);
    let caller = controller.links.caller.take();

    if let Some(caller) = caller
        && let Some(awaiting) = core.tasks.borrow().get(caller)
    {
        awaiting.links.callee.set(None);
    }

    // Drops the owner subscription.
    drop(controller);

    debug!(task.id = %key.id(), "completed");
    core.track(Method::Complete, Call::Complete { id: key.id() });

    if let Some(caller) = caller {
        core.event_loop.post_resume(caller);
    }
}

/// Tears down the task of `key` together with its whole call chain.
///
/// The callee is aborted first, then this frame is dropped, then the caller is
/// aborted, so the deepest frame of a chain is always destroyed first. Every
/// controller is visited once: a second abort of the same task is a no-op.
pub(crate) fn abort(core: &Rc<Core>, key: TaskKey) {
    let (watch, links) = {
        let mut tasks = core.tasks.borrow_mut();
        let Some(controller) = tasks.get_mut(key) else {
            return;
        };
        if controller.aborting {
            return;
        }
        controller.aborting = true;
        (controller.owner_watch.take(), Rc::clone(&controller.links))
    };

    debug!(task.id = %key.id(), "aborting");
    core.track(Method::Abort, Call::Abort { id: key.id() });

    links.current.set(None);

    let callee = links.callee.take();
    let caller = links.caller.take();
    {
        let tasks = core.tasks.borrow();
        if let Some(callee) = callee.and_then(|callee| tasks.get(callee)) {
            callee.links.caller.set(None);
        }
        if let Some(caller) = caller.and_then(|caller| tasks.get(caller)) {
            caller.links.callee.set(None);
        }
    }

    drop(watch);

    if let Some(callee) = callee {
        debug!(task.id = %key.id(), callee.id = %callee.id(), "cascading abort down");
        abort(core, callee);
    }

    let removed = core.tasks.borrow_mut().remove(key);
    if let Some(controller) = removed {
        // No frame means it is being polled right now, the poller drops it.
        if controller.frame.is_some() {
            drop(controller);
            core.track(
                Method::Destroy,
                Call::Destroy {
                    id: key.id(),
                    deferred: false,
                },
            );
        }
    }

    if let Some(caller) = caller {
        debug!(task.id = %key.id(), caller.id = %caller.id(), "cascading abort up");
        abort(core, caller);
    }
}

fn unhandled_panic(
    core: &Rc<Core>,
    key: TaskKey,
    frame: BoxFrame,
    payload: Box<dyn Any + Send>,
) {
    let message = panic_message(payload.as_ref());
    core.track(Method::UnhandledPanic, Call::UnhandledPanic { id: key.id() });

    match core.cfg.on_task_panic {
        OnTaskPanic::Abort => {
            error!(task.id = %key.id(), panic = %message, "task panicked, aborting process");
            std::process::abort();
        }
        OnTaskPanic::Unwind => {
            error!(task.id = %key.id(), panic = %message, "task panicked, tearing down its chain");
            abort(core, key);
            drop(frame);
            panic::resume_unwind(payload);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

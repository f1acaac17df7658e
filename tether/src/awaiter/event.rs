use crate::awaiter::{Awaitable, Continuation, Suspension};
use crate::object::{ObjectRef, Ownable, Signal, Subscription};
use crate::task::TaskError;
use bitflags::bitflags;
use std::cell::RefCell;
use std::fmt;
use std::future::IntoFuture;
use std::rc::{Rc, Weak};
use tracing::debug;

bitflags! {
    /// Delivery modes of an [`EventAwaiter`].
    ///
    /// ```
    /// use tether::EventFlags;
    ///
    /// let flags = EventFlags::SINGLE_SHOT | EventFlags::DESTROY_SENDER_ON_EVENT;
    /// assert!(flags.contains(EventFlags::SINGLE_SHOT));
    /// assert_eq!(EventFlags::default(), EventFlags::SINGLE_SHOT);
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventFlags: u8 {
        /// Deliver the first emission only. The awaiter stops watching the
        /// sender as soon as it fires.
        const SINGLE_SHOT = 1 << 0;

        /// Destroy the sender right after its event got delivered, before the
        /// awaiting task resumes.
        const DESTROY_SENDER_ON_EVENT = 1 << 1;
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        EventFlags::SINGLE_SHOT
    }
}

struct EventState<T> {
    sender: ObjectRef,

    // At most one buffered emission, newer ones overwrite it.
    payload: Option<T>,

    // Single-shot awaiter that already fired.
    received: bool,

    continuation: Option<Continuation>,
    event: Option<Subscription>,
    sender_watch: Option<Subscription>,
}

/// Suspends a task until `signal` is emitted by `sender`.
///
/// If the sender is destroyed while a task awaits it, the task is aborted
/// together with its call chain. Awaiting on a sender that is already gone
/// aborts right away.
///
/// By default the awaiter is single-shot and is consumed by `.await`. Without
/// [`EventFlags::SINGLE_SHOT`] it can be awaited repeatedly through
/// `&mut EventAwaiter`.
pub struct EventAwaiter<T: Clone + 'static> {
    signal: Signal<T>,
    flags: EventFlags,
    state: Rc<RefCell<EventState<T>>>,
}

impl<T: Clone + 'static> EventAwaiter<T> {
    pub fn new(sender: impl Into<ObjectRef>, signal: &Signal<T>) -> Self {
        Self::with_flags(sender, signal, EventFlags::default())
    }

    pub fn with_flags(sender: impl Into<ObjectRef>, signal: &Signal<T>, flags: EventFlags) -> Self {
        Self {
            signal: signal.clone(),
            flags,
            state: Rc::new(RefCell::new(EventState {
                sender: sender.into(),
                payload: None,
                received: false,
                continuation: None,
                event: None,
                sender_watch: None,
            })),
        }
    }

    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    fn subscribe(&self, state: &mut EventState<T>) {
        let weak = Rc::downgrade(&self.state);
        state.sender_watch = Some(state.sender.on_destroyed(Box::new(move || {
            on_sender_destroyed(&weak);
        })));

        let weak = Rc::downgrade(&self.state);
        let flags = self.flags;
        let receiver = move |payload: T| on_event(&weak, flags, payload);

        state.event = Some(if flags.contains(EventFlags::SINGLE_SHOT) {
            self.signal.connect_once(receiver)
        } else {
            self.signal.connect(receiver)
        });
    }
}

fn on_sender_destroyed<T>(state: &Weak<RefCell<EventState<T>>>) {
    let Some(state) = state.upgrade() else {
        return;
    };

    let (continuation, event) = {
        let mut state = state.borrow_mut();
        (state.continuation.take(), state.event.take())
    };
    drop(event);

    if let Some(continuation) = continuation {
        debug!(task.id = %continuation.task_id(), "sender destroyed while awaited");
        continuation.abort();
    }
}

fn on_event<T>(state: &Weak<RefCell<EventState<T>>>, flags: EventFlags, payload: T) {
    let Some(state) = state.upgrade() else {
        return;
    };

    let (continuation, watch, sender) = {
        let mut state = state.borrow_mut();
        state.payload = Some(payload);

        let mut watch = None;
        if flags.contains(EventFlags::SINGLE_SHOT) {
            state.received = true;
            watch = state.sender_watch.take();
        }

        let mut sender = None;
        if flags.contains(EventFlags::DESTROY_SENDER_ON_EVENT) {
            watch = watch.or_else(|| state.sender_watch.take());
            sender = Some(state.sender.clone());
        }

        (state.continuation.take(), watch, sender)
    };
    drop(watch);

    if let Some(sender) = sender {
        debug!(sender = ?sender.name(), "destroying sender on event");
        sender.destroy();
    }

    if let Some(continuation) = continuation {
        continuation.resume();
    }
}

impl<T: Clone + 'static> Awaitable for EventAwaiter<T> {
    type Output = T;

    fn ready(&self) -> bool {
        self.state.borrow().payload.is_some()
    }

    fn suspend(&mut self, continuation: &Continuation) -> Result<(), TaskError> {
        let mut state = self.state.borrow_mut();

        if state.received {
            return Err(TaskError::EventConsumed);
        }

        if !state.sender.is_alive() {
            drop(state);
            debug!(task.id = %continuation.task_id(), "sender already destroyed");
            continuation.abort();
            return Ok(());
        }

        state.continuation = Some(continuation.clone());

        if state.event.is_none() {
            self.subscribe(&mut state);
        }

        Ok(())
    }

    fn resume(&mut self) -> Result<T, TaskError> {
        self.state
            .borrow_mut()
            .payload
            .take()
            .ok_or(TaskError::NotReady)
    }

    fn cancel(&mut self, continuation: &Continuation) {
        let mut state = self.state.borrow_mut();
        if state
            .continuation
            .as_ref()
            .is_some_and(|stored| stored.key() == continuation.key())
        {
            state.continuation = None;
        }
    }
}

impl<T: Clone + 'static> IntoFuture for EventAwaiter<T> {
    type Output = T;
    type IntoFuture = Suspension<EventAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Suspension::new(self)
    }
}

impl<'a, T: Clone + 'static> IntoFuture for &'a mut EventAwaiter<T> {
    type Output = T;
    type IntoFuture = Suspension<&'a mut EventAwaiter<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Suspension::new(self)
    }
}

impl<T: Clone + 'static> fmt::Debug for EventAwaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventAwaiter")
            .field("sender", &state.sender)
            .field("flags", &self.flags)
            .field("ready", &state.payload.is_some())
            .field("subscribed", &state.event.is_some())
            .finish()
    }
}

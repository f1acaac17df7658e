use crate::runtime::RuntimeConfig;
use crate::task::TaskKey;
use parking_lot::{Condvar, Mutex};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

pub(crate) type Callback = Box<dyn FnOnce()>;

pub(crate) enum Runnable {
    Callback(Callback),

    /// Poll the task again. Resuming a task that no longer exists is a no-op.
    Resume(TaskKey),
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runnable::Callback(_) => f.write_str("Callback"),
            Runnable::Resume(key) => f.debug_tuple("Resume").field(key).finish(),
        }
    }
}

pub(crate) struct Timer {
    deadline: Instant,

    // Timers sharing a deadline fire in the order they were posted.
    seq: u64,

    callback: Callback,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed, the earliest deadline sits on top of the max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Task resumptions coming from other threads, e.g. a background computation
/// finishing a [`Promise`](crate::Promise).
#[derive(Debug, Default)]
pub(crate) struct Inbox {
    keys: Mutex<VecDeque<TaskKey>>,
    available: Condvar,
}

impl Inbox {
    pub(crate) fn push(&self, key: TaskKey) {
        self.keys.lock().push_back(key);
        self.available.notify_one();
    }

    fn take(&self) -> VecDeque<TaskKey> {
        std::mem::take(&mut *self.keys.lock())
    }

    fn wait(&self, timeout: Duration) {
        let mut keys = self.keys.lock();
        if keys.is_empty() {
            let _ = self.available.wait_for(&mut keys, timeout);
        }
    }
}

// FIFO queue of posted work plus timers, owned by the runtime core. Only the
// inbox is shared with other threads.
pub(crate) struct EventLoop {
    queue: RefCell<VecDeque<Runnable>>,
    timers: RefCell<BinaryHeap<Timer>>,
    next_seq: Cell<u64>,
    inbox: Arc<Inbox>,
    idle_interval: Duration,
    pub(crate) running: Cell<bool>,
    pub(crate) stopped: Cell<bool>,
}

impl EventLoop {
    pub(crate) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            queue: RefCell::new(VecDeque::with_capacity(cfg.tasks_capacity)),
            timers: RefCell::new(BinaryHeap::new()),
            next_seq: Cell::new(0),
            inbox: Arc::new(Inbox::default()),
            idle_interval: cfg.idle_interval,
            running: Cell::new(false),
            stopped: Cell::new(false),
        }
    }

    pub(crate) fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    pub(crate) fn post(&self, callback: Callback) {
        trace!("posting callback");
        self.queue.borrow_mut().push_back(Runnable::Callback(callback));
    }

    pub(crate) fn post_resume(&self, key: TaskKey) {
        trace!(task.id = %key.id(), "posting resumption");
        self.queue.borrow_mut().push_back(Runnable::Resume(key));
    }

    pub(crate) fn post_after(&self, delay: Duration, callback: Callback) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);

        self.timers.borrow_mut().push(Timer {
            deadline: Instant::now() + delay,
            seq,
            callback,
        });
    }

    pub(crate) fn stop(&self) {
        self.stopped.set(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    pub(crate) fn has_timers(&self) -> bool {
        !self.timers.borrow().is_empty()
    }

    /// Next unit of work: remote wakes and due timers are moved to the back of
    /// the queue first.
    pub(crate) fn next_runnable(&self) -> Option<Runnable> {
        let remote = self.inbox.take();
        if !remote.is_empty() {
            self.queue
                .borrow_mut()
                .extend(remote.into_iter().map(Runnable::Resume));
        }

        self.fire_due_timers(Instant::now());

        self.queue.borrow_mut().pop_front()
    }

    fn fire_due_timers(&self, now: Instant) {
        let mut timers = self.timers.borrow_mut();
        let mut queue = self.queue.borrow_mut();

        while timers.peek().is_some_and(|timer| timer.deadline <= now) {
            if let Some(timer) = timers.pop() {
                queue.push_back(Runnable::Callback(timer.callback));
            }
        }
    }

    /// Blocks until a remote wake arrives, the next timer is due or the idle
    /// interval elapsed, whichever comes first.
    pub(crate) fn park(&self) {
        let timeout = self
            .timers
            .borrow()
            .peek()
            .map_or(self.idle_interval, |timer| {
                timer
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.idle_interval)
            });

        if !timeout.is_zero() {
            self.inbox.wait(timeout);
        }
    }

    /// Takes every pending runnable and timer out of the loop. The caller drops
    /// them, outside of any borrow.
    pub(crate) fn drain(&self) -> (VecDeque<Runnable>, BinaryHeap<Timer>) {
        let queue = std::mem::take(&mut *self.queue.borrow_mut());
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        self.inbox.take();
        (queue, timers)
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("queued", &self.queue.borrow().len())
            .field("timers", &self.timers.borrow().len())
            .field("running", &self.running.get())
            .field("stopped", &self.stopped.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn event_loop() -> EventLoop {
        EventLoop::new(&RuntimeConfig::default())
    }

    fn run_all(event_loop: &EventLoop) {
        while let Some(runnable) = event_loop.next_runnable() {
            if let Runnable::Callback(callback) = runnable {
                callback();
            }
        }
    }

    #[test]
    fn test_callbacks_run_in_post_order() {
        let event_loop = event_loop();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for i in 0..5 {
            let seen = Rc::clone(&seen);
            event_loop.post(Box::new(move || seen.borrow_mut().push(i)));
        }

        run_all(&event_loop);
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_timers_fire_by_deadline_then_post_order() {
        let event_loop = event_loop();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for (label, delay) in [("late", 20), ("first", 0), ("second", 0), ("mid", 10)] {
            let seen = Rc::clone(&seen);
            event_loop.post_after(
                Duration::from_millis(delay),
                Box::new(move || seen.borrow_mut().push(label)),
            );
        }

        while event_loop.has_timers() {
            event_loop.park();
            run_all(&event_loop);
        }

        assert_eq!(*seen.borrow(), vec!["first", "second", "mid", "late"]);
    }

    #[test]
    fn test_timer_not_due_stays_pending() {
        let event_loop = event_loop();
        event_loop.post_after(Duration::from_secs(60), Box::new(|| {}));

        assert!(event_loop.next_runnable().is_none());
        assert!(event_loop.has_timers());

        let (queue, timers) = event_loop.drain();
        assert!(queue.is_empty());
        assert_eq!(timers.len(), 1);
        assert!(!event_loop.has_timers());
    }
}

use crate::context;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::fmt;

/// An opaque ID that uniquely identifies a task.
///
/// Ids are never reused, not even across runtimes, so an id held by a stale
/// resumption can never be mistaken for a newer task occupying the same arena
/// slot.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(NonZeroU64);

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// Panics if called outside of a task body. See [`try_id`] for a version that
/// does not panic.
#[track_caller]
pub fn id() -> Id {
    try_id().expect("Can't get a task id when not inside a task")
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task body.
pub fn try_id() -> Option<Id> {
    context::current_task().map(|key| key.id())
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Would take centuries to wrap even at a billion tasks per second.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

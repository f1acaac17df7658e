//! Owners and event sources.
//!
//! Every task is bound to an owner implementing [`Ownable`]. [`Object`] is the
//! provided owner: a named, thread-bound value that announces its destruction
//! to subscribers. [`ObjectRef`] observes an object without keeping it alive.

use crate::context;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

mod signal;
pub use signal::{Signal, Subscription};

/// The owner capability required to spawn a task.
pub trait Ownable {
    /// Registers `callback` to run once when the owner is destroyed. Dropping
    /// the returned subscription unregisters it. Owners that are already
    /// destroyed return an empty subscription and never run `callback`.
    fn on_destroyed(&self, callback: Box<dyn FnOnce()>) -> Subscription;

    /// The thread the owner lives on.
    fn thread_id(&self) -> ThreadId;

    fn is_alive(&self) -> bool;
}

struct ObjectInner {
    name: String,
    thread_id: ThreadId,
    alive: Cell<bool>,
    destroyed: Signal<()>,
}

impl ObjectInner {
    fn destroy(&self) {
        if !self.alive.replace(false) {
            return;
        }

        debug!(object = %self.name, "destroyed");
        self.destroyed.emit(());
        self.destroyed.disconnect_all();
    }

    fn on_destroyed(&self, callback: Box<dyn FnOnce()>) -> Subscription {
        if !self.alive.get() {
            return Subscription::empty();
        }

        self.destroyed.connect_once(move |()| callback())
    }
}

/// An owner object. Destroyed when dropped or when [`Object::destroy`] is
/// called, whichever comes first.
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                name: name.into(),
                thread_id: thread::current().id(),
                alive: Cell::new(true),
                destroyed: Signal::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn downgrade(&self) -> ObjectRef {
        ObjectRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Destroys the object now. Tasks owned by it are aborted before this
    /// returns. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Destroys the object once control returns to the event loop. Without a
    /// runtime on this thread the object is destroyed immediately.
    pub fn delete_later(self) {
        match context::try_core() {
            Some(core) => core.event_loop.post(Box::new(move || drop(self))),
            None => drop(self),
        }
    }
}

impl Ownable for Object {
    fn on_destroyed(&self, callback: Box<dyn FnOnce()>) -> Subscription {
        self.inner.on_destroyed(callback)
    }

    fn thread_id(&self) -> ThreadId {
        self.inner.thread_id
    }

    fn is_alive(&self) -> bool {
        self.inner.alive.get()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.inner.name)
            .field("alive", &self.inner.alive.get())
            .finish()
    }
}

/// A guarded, non-owning reference to an [`Object`]. Turns dead once the object
/// is destroyed, even while the underlying allocation lingers.
#[derive(Clone, Default)]
pub struct ObjectRef {
    inner: Weak<ObjectInner>,
}

impl ObjectRef {
    fn upgrade(&self) -> Option<Rc<ObjectInner>> {
        self.inner.upgrade().filter(|inner| inner.alive.get())
    }

    /// Destroys the referenced object if it is still alive.
    pub fn destroy(&self) {
        if let Some(inner) = self.upgrade() {
            inner.destroy();
        }
    }

    pub fn name(&self) -> Option<String> {
        self.upgrade().map(|inner| inner.name.clone())
    }
}

impl From<&Object> for ObjectRef {
    fn from(object: &Object) -> Self {
        object.downgrade()
    }
}

impl Ownable for ObjectRef {
    fn on_destroyed(&self, callback: Box<dyn FnOnce()>) -> Subscription {
        match self.upgrade() {
            Some(inner) => inner.on_destroyed(callback),
            None => Subscription::empty(),
        }
    }

    fn thread_id(&self) -> ThreadId {
        // A dead reference has no thread of its own, it is treated as local
        // so spawning on it yields an inert handle.
        self.inner
            .upgrade()
            .map_or_else(|| thread::current().id(), |inner| inner.thread_id)
    }

    fn is_alive(&self) -> bool {
        self.upgrade().is_some()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("name", &self.name())
            .field("alive", &self.is_alive())
            .finish()
    }
}

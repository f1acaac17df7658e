use crate::object::{Object, Signal};
use crate::runtime::{Builder, OnTaskPanic, Runtime};
use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

// Tests unwind on task panics instead of aborting the test binary, and fail
// instead of hanging when something never wakes up.
#[must_use]
pub(crate) fn init_local_runtime(builder: Option<Builder>) -> Result<Runtime> {
    init_tracing();

    let builder = builder.unwrap_or_else(|| {
        Builder::new_local()
            .idle_interval(Duration::from_millis(5))
            .stall_timeout(Duration::from_secs(5))
            .on_task_panic(OnTaskPanic::Unwind)
    });

    builder.try_build()
}

/// Ordered log shared between a test and the task bodies it spawns.
#[derive(Clone, Debug, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn log(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Names of the dropped markers, in drop order.
    pub(crate) fn destroyed(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|entry| entry.strip_suffix(" destroyed"))
            .map(str::to_string)
            .collect()
    }

    /// Creates a marker logging `"{name} destroyed"` once dropped. Bind it to a
    /// local at the top of a task body to observe when the frame goes away.
    pub(crate) fn marker(&self, name: impl Into<String>) -> Marker {
        let name = name.into();
        self.log(format!("{name} created"));
        Marker {
            name,
            journal: self.clone(),
        }
    }
}

pub(crate) struct Marker {
    name: String,
    journal: Journal,
}

impl Drop for Marker {
    fn drop(&mut self) {
        self.journal.log(format!("{} destroyed", self.name));
    }
}

/// A sender object together with a signal it emits.
pub(crate) struct Emitter<T: Clone + 'static> {
    pub(crate) object: Object,
    pub(crate) signal: Signal<T>,
}

impl<T: Clone + 'static> Emitter<T> {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            object: Object::new(name),
            signal: Signal::new(),
        }
    }

    pub(crate) fn emit(&self, payload: T) {
        self.signal.emit(payload);
    }
}

/// Message of a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::new()
    }
}

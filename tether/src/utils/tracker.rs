#![allow(unused)]

use crate::task::Id;
#[cfg(test)]
use dashmap::DashMap;
#[cfg(test)]
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Spawn,
    Resume,
    Complete,
    Abort,
    Destroy,
    UnhandledPanic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Spawn { id: Id },
    Resume { id: Id },
    Complete { id: Id },
    Abort { id: Id },

    /// A frame was dropped. `deferred` is set when the frame was being polled
    /// at abort time and got dropped once the poll returned.
    Destroy { id: Id, deferred: bool },

    UnhandledPanic { id: Id },
}

impl Call {
    pub(crate) fn id(&self) -> Id {
        match self {
            Call::Spawn { id }
            | Call::Resume { id }
            | Call::Complete { id }
            | Call::Abort { id }
            | Call::Destroy { id, .. }
            | Call::UnhandledPanic { id } => *id,
        }
    }
}

// Records what the runtime does to tasks so tests can assert on ordering.
// Call sites are compiled in every build, recording only happens in tests.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
}

#[cfg(test)]
impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        map.insert(Method::Spawn, Vec::new());
        map.insert(Method::Resume, Vec::new());
        map.insert(Method::Complete, Vec::new());
        map.insert(Method::Abort, Vec::new());
        map.insert(Method::Destroy, Vec::new());
        map.insert(Method::UnhandledPanic, Vec::new());

        Self {
            calls: Arc::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    /// Task ids of the calls recorded for `method`, in recording order.
    pub(crate) fn ids(&self, method: &Method) -> Vec<Id> {
        self.get_calls(method).iter().map(Call::id).collect()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.get(method).map_or(0, |calls| calls.len())
    }
}

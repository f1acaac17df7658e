use crate::task::Id;
use crate::task::controller::Controller;
use slab::Slab;
use std::fmt;

/// Checked reference to a [`Controller`] living in the [`Registry`].
///
/// Slots are recycled, ids are not: a key whose task is gone resolves to
/// nothing even if its slot got reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskKey {
    slot: usize,
    id: Id,
}

impl TaskKey {
    pub(crate) fn id(&self) -> Id {
        self.id
    }
}

impl fmt::Debug for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskKey({}@{})", self.id, self.slot)
    }
}

// The arena of all live controllers of a runtime. A controller is inserted
// when its task is spawned and removed on completion or abort, which is also
// when its frame gets dropped.
//
// The registry lives in a `RefCell` on the runtime core. Callers must never
// poll or drop a frame while holding that borrow: both run arbitrary user
// code, which is allowed to spawn, complete and abort tasks.
pub(crate) struct Registry {
    entries: Slab<Controller>,

    // Set on shutdown to refuse new tasks while the remaining ones are torn
    // down.
    closed: bool,
}

impl Registry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Slab::with_capacity(capacity),
            closed: false,
        }
    }

    /// Inserts a controller, or hands it back if the registry is closed.
    pub(crate) fn insert(&mut self, controller: Controller) -> Result<TaskKey, Controller> {
        if self.closed {
            return Err(controller);
        }

        let entry = self.entries.vacant_entry();
        let key = TaskKey {
            slot: entry.key(),
            id: controller.id(),
        };
        entry.insert(controller);

        Ok(key)
    }

    pub(crate) fn get(&self, key: TaskKey) -> Option<&Controller> {
        self.entries
            .get(key.slot)
            .filter(|controller| controller.id() == key.id)
    }

    pub(crate) fn get_mut(&mut self, key: TaskKey) -> Option<&mut Controller> {
        self.entries
            .get_mut(key.slot)
            .filter(|controller| controller.id() == key.id)
    }

    pub(crate) fn contains(&self, key: TaskKey) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn remove(&mut self, key: TaskKey) -> Option<Controller> {
        if self.contains(key) {
            Some(self.entries.remove(key.slot))
        } else {
            None
        }
    }

    pub(crate) fn keys(&self) -> Vec<TaskKey> {
        self.entries
            .iter()
            .map(|(slot, controller)| TaskKey {
                slot,
                id: controller.id(),
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.entries.len())
            .field("closed", &self.closed)
            .finish()
    }
}

//! Tasks: owner-bound bodies that run on the runtime thread.
//!
//! A task is started with [`spawn`] for an owner and runs eagerly until it
//! first suspends. From then on it is resumed by the event loop. Destroying
//! the owner aborts the task: its frame is dropped right away, together with
//! every frame linked to it through nested awaits.

use crate::context;
use crate::object::Ownable;
use std::future::Future;

mod controller;
pub(crate) use controller::{abort, poll};

mod error;
pub use error::TaskError;

mod handle;
pub use handle::TaskHandle;

pub(crate) mod id;
pub use id::{Id, id, try_id};

mod registry;
pub(crate) use registry::{Registry, TaskKey};

mod state;


/// Spawns `body` as a task bound to `owner`.
///
/// The body starts running immediately and returns control to the caller at
/// its first suspension point. If `owner` is already destroyed the body never
/// runs and the returned handle is settled.
///
/// # Panics
///
/// Panics if there is no runtime on the current thread or if `owner` belongs
/// to a different thread. See [`try_spawn`] for a version that does not panic
/// for these reasons. Panics of the body itself are handled according to
/// [`OnTaskPanic`](crate::runtime::OnTaskPanic).
#[track_caller]
pub fn spawn<O, F>(owner: &O, body: F) -> TaskHandle<F::Output>
where
    O: Ownable + ?Sized,
    F: Future + 'static,
    F::Output: 'static,
{
    match try_spawn(owner, body) {
        Ok(handle) => handle,
        Err(err) => panic!("failed to spawn task: {err}"),
    }
}

pub fn try_spawn<O, F>(owner: &O, body: F) -> Result<TaskHandle<F::Output>, TaskError>
where
    O: Ownable + ?Sized,
    F: Future + 'static,
    F::Output: 'static,
{
    let core = context::core()?;
    controller::spawn(&core, owner, body)
}

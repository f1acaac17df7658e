//! A single-threaded cooperative task runtime whose tasks live and die with
//! the objects that own them.
//!
//! A task is an `async` body started with [`spawn`] on behalf of an owner
//! (anything implementing [`Ownable`], usually an [`Object`]). The body runs
//! eagerly until it awaits one of three things:
//!
//! * another task, through its [`TaskHandle`],
//! * an event, through an [`EventAwaiter`] over a [`Signal`],
//! * a single-completion result, through a [`Deferred`] (or any
//!   [`Completion`] source wrapped in a [`FutureAwaiter`]).
//!
//! When the owner of any task in a chain of awaiting tasks is destroyed, the
//! whole chain is torn down, deepest frame first. Resumptions are always
//! posted to the [`Runtime`]'s event loop, never run inline.
//!
//! ```no_run
//! use tether::{Object, runtime::Builder};
//!
//! # fn main() -> anyhow::Result<()> {
//! let runtime = Builder::new_local().try_build()?;
//! let owner = Object::new("owner");
//!
//! let answer = tether::spawn(&owner, async { 42 });
//! let doubled = tether::spawn(&owner, async move { answer.await * 2 });
//!
//! runtime.run_until(&doubled)?;
//! assert_eq!(doubled.take_result()?, 84);
//! # Ok(())
//! # }
//! ```

mod context;

pub mod awaiter;
pub use awaiter::{
    Awaitable, Completion, Continuation, EventAwaiter, EventFlags, FutureAwaiter, Suspension,
};

pub mod concurrent;
pub use concurrent::{Deferred, Promise};

pub mod object;
pub use object::{Object, ObjectRef, Ownable, Signal, Subscription};

pub mod runtime;
pub use runtime::{Runtime, post, single_shot, single_shot_scoped, stop};

pub mod task;
pub use task::{TaskError, TaskHandle, spawn, try_spawn};

mod utils;

#[cfg(test)]
mod test_utils;

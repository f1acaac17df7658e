use crate::runtime::RuntimeError;
use crate::task::Id;

/// Violations of the task protocol.
///
/// Inside a task body these surface as panics at the offending `.await`, and
/// are therefore handled according to
/// [`OnTaskPanic`](crate::runtime::OnTaskPanic). Outside of a body they are
/// returned by [`try_spawn`](crate::try_spawn) and
/// [`TaskHandle::take_result`](crate::TaskHandle::take_result).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The awaited task was already completed or aborted when it got awaited.
    #[error("task {0} is no longer running")]
    Detached(Id),

    /// A task can only have one awaiting caller at a time.
    #[error("task {awaited} is already awaited by task {caller}")]
    AlreadyAwaited { awaited: Id, caller: Id },

    /// A task awaits at most one other task at a time, e.g. not two handles
    /// joined together.
    #[error("task {caller} already awaits task {awaited}")]
    AlreadyAwaiting { caller: Id, awaited: Id },

    #[error("suspension points can only be awaited from inside a task body")]
    NoCurrentTask,

    #[error("result is not ready yet")]
    NotReady,

    #[error("result already taken")]
    ResultTaken,

    /// A single-shot event awaiter was awaited again after it delivered.
    #[error("single-shot event was already delivered")]
    EventConsumed,

    #[error("owner lives on a different thread than the runtime")]
    ForeignOwner,

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

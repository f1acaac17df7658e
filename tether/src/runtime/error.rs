use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Cannot create a new runtime: a runtime is already active on this thread")]
    AlreadyActive,

    #[error("The event loop is already running on this thread")]
    AlreadyRunning,

    /// Returned by the event loop after having nothing to run and no pending
    /// timers for longer than the configured stall timeout.
    #[error("Event loop stalled: no work and no timers for {0:?}")]
    Stalled(Duration),

    #[error("No runtime is active on this thread")]
    NoRuntime,
}

use std::marker::PhantomData;

/// Runs a closure when it goes out of scope, whether the scope is left by a
/// normal return, an early return or a panic.
///
/// The runtime uses it to restore thread-local state (the current task, the
/// running flag of the event loop) while task bodies are polled, since a body
/// may panic and unwind straight through the poll.
pub(crate) struct ScopeGuard<'a, F: FnOnce()> {
    // Taken exactly once, either on drop or by `disarm`.
    closure: Option<F>,

    _p: PhantomData<&'a ()>,
}

impl<'a, F: FnOnce()> ScopeGuard<'a, F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
            _p: PhantomData,
        }
    }

    /// Prevents the closure from running on drop.
    #[allow(dead_code)]
    pub(crate) fn disarm(&mut self) {
        self.closure.take();
    }
}

impl<'a, F: FnOnce()> Drop for ScopeGuard<'a, F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

use crate::context;
use crate::object::Ownable;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Runs `callback` on the event loop once `delay` elapsed.
///
/// # Panics
///
/// Panics if there is no runtime on the current thread.
#[track_caller]
pub fn single_shot<F>(delay: Duration, callback: F)
where
    F: FnOnce() + 'static,
{
    context::expect_core()
        .event_loop
        .post_after(delay, Box::new(callback));
}

/// Like [`single_shot`], but `callback` is dropped without running if
/// `context` is destroyed before the timer fires.
#[track_caller]
pub fn single_shot_scoped<O, F>(context: &O, delay: Duration, callback: F)
where
    O: Ownable + ?Sized,
    F: FnOnce() + 'static,
{
    if !context.is_alive() {
        return;
    }

    let destroyed = Rc::new(Cell::new(false));
    let watch = context.on_destroyed(Box::new({
        let destroyed = Rc::clone(&destroyed);
        move || destroyed.set(true)
    }));

    single_shot(delay, move || {
        drop(watch);
        if !destroyed.get() {
            callback();
        }
    });
}

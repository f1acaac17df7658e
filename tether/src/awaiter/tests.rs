use super::*;
use crate::concurrent::{self, Promise};
use crate::object::{Object, Ownable};
use crate::task::spawn;
use crate::test_utils::*;
use crate::utils::tracker::{Call, Method};
use anyhow::Result;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

fn await_payload<T>(payload: T) -> Result<()>
where
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let sender = Emitter::<T>::new("sender");

    let handle = spawn(&owner, EventAwaiter::new(&sender.object, &sender.signal).into_future());
    assert!(!handle.ready());

    sender.emit(payload.clone());
    runtime.run_until(&handle)?;

    assert_eq!(handle.take_result()?, payload);
    assert_eq!(sender.signal.receiver_count(), 0);
    Ok(())
}

#[test]
fn test_awaiting_signal_with_two_arguments() -> Result<()> {
    await_payload((2, "2".to_string()))
}

#[test]
fn test_awaiting_signal_with_one_argument() -> Result<()> {
    await_payload(1)
}

#[test]
fn test_awaiting_signal_without_arguments() -> Result<()> {
    await_payload(())
}

#[test]
fn test_single_shot_observes_first_emission_only() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let sender = Emitter::<i32>::new("sender");

    let handle = spawn(&owner, EventAwaiter::new(&sender.object, &sender.signal).into_future());
    assert_eq!(sender.signal.receiver_count(), 1);

    sender.emit(1);
    assert_eq!(sender.signal.receiver_count(), 0);
    sender.emit(2);

    runtime.run_until(&handle)?;
    assert_eq!(handle.take_result()?, 1);
    Ok(())
}

#[test]
fn test_sender_destroyed_while_awaited_aborts_chain() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");
    let sender = Emitter::<()>::new("sender");

    let inner = spawn(&owner, {
        let journal = journal.clone();
        let event = EventAwaiter::new(&sender.object, &sender.signal);
        async move {
            let _frame = journal.marker("inner");
            event.await;
        }
    });
    let outer = spawn(&owner, {
        let journal = journal.clone();
        let inner = inner.clone();
        async move {
            let _frame = journal.marker("outer");
            inner.await;
        }
    });

    sender.object.destroy();

    assert_eq!(journal.destroyed(), ["inner", "outer"]);
    assert!(inner.is_settled() && outer.is_settled());
    assert!(owner.is_alive());
    assert_eq!(sender.signal.receiver_count(), 0);
    assert_eq!(runtime.num_tasks(), 0);
    Ok(())
}

#[test]
fn test_awaiting_destroyed_sender_aborts_immediately() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");
    let sender = Emitter::<()>::new("sender");
    sender.object.destroy();

    let handle = spawn(&owner, {
        let journal = journal.clone();
        let event = EventAwaiter::new(&sender.object, &sender.signal);
        async move {
            let _frame = journal.marker("task");
            event.await;
            journal.log("resumed");
        }
    });

    assert!(handle.is_settled());
    assert_eq!(journal.entries(), ["task created", "task destroyed"]);
    assert_eq!(
        runtime.core().tracker.get_calls(&Method::Destroy),
        [Call::Destroy {
            id: handle.id(),
            deferred: true
        }]
    );
    assert_eq!(sender.signal.receiver_count(), 0);
    Ok(())
}

#[test]
fn test_sender_destroyed_on_event_before_resumption() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");
    let sender = Emitter::<i32>::new("sender");

    let _sender_watch = sender.object.on_destroyed(Box::new({
        let journal = journal.clone();
        move || journal.log("sender destroyed")
    }));

    let handle = spawn(&owner, {
        let journal = journal.clone();
        let event = EventAwaiter::with_flags(
            &sender.object,
            &sender.signal,
            EventFlags::SINGLE_SHOT | EventFlags::DESTROY_SENDER_ON_EVENT,
        );
        async move {
            let value = event.await;
            journal.log(format!("resumed with {value}"));
        }
    });

    sender.emit(5);

    // Destroyed inside the emission, the task itself was not aborted.
    assert!(!sender.object.is_alive());
    assert_eq!(journal.entries(), ["sender destroyed"]);
    assert!(handle.is_running());

    runtime.run_until(&handle)?;

    assert_eq!(journal.entries(), ["sender destroyed", "resumed with 5"]);
    assert!(handle.ready());
    Ok(())
}

#[test]
fn test_repeat_mode_delivers_every_emission() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let sender = Emitter::<i32>::new("sender");

    let handle = spawn(&owner, {
        let mut event =
            EventAwaiter::with_flags(&sender.object, &sender.signal, EventFlags::empty());
        async move {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push((&mut event).await);
            }
            seen
        }
    });

    for value in 1..=3 {
        sender.emit(value);
        runtime.run_pending()?;
    }

    assert_eq!(handle.take_result()?, [1, 2, 3]);
    assert_eq!(sender.signal.receiver_count(), 0);
    Ok(())
}

#[test]
fn test_repeat_mode_buffers_latest_emission() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let sender = Emitter::<i32>::new("sender");

    let handle = spawn(&owner, {
        let mut event =
            EventAwaiter::with_flags(&sender.object, &sender.signal, EventFlags::empty());
        async move {
            let first = (&mut event).await;
            let second = (&mut event).await;
            (first, second)
        }
    });

    sender.emit(1);
    sender.emit(2);
    runtime.run_pending()?;
    assert!(handle.is_running());

    sender.emit(3);
    runtime.run_until(&handle)?;

    assert_eq!(handle.take_result()?, (2, 3));
    Ok(())
}

#[test]
fn test_repeat_mode_aborts_once_sender_is_gone() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");
    let sender = Emitter::<i32>::new("sender");

    let handle = spawn(&owner, {
        let journal = journal.clone();
        let mut event =
            EventAwaiter::with_flags(&sender.object, &sender.signal, EventFlags::empty());
        async move {
            let _frame = journal.marker("task");
            for _ in 0..2 {
                let value = (&mut event).await;
                journal.log(format!("got {value}"));
            }
        }
    });

    sender.emit(1);
    sender.object.destroy();
    assert!(handle.is_running());

    // The buffered value is still delivered, the next await aborts.
    runtime.run_pending()?;

    assert_eq!(
        journal.entries(),
        ["task created", "got 1", "task destroyed"]
    );
    assert!(handle.is_settled());
    assert_eq!(sender.signal.receiver_count(), 0);
    Ok(())
}

#[test]
fn test_awaiting_single_shot_again_panics() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let sender = Emitter::<()>::new("sender");

    let handle = spawn(&owner, {
        let mut event = EventAwaiter::new(&sender.object, &sender.signal);
        async move {
            (&mut event).await;
            (&mut event).await;
        }
    });

    sender.emit(());
    let res = panic::catch_unwind(AssertUnwindSafe(|| runtime.run_pending()));

    let message = panic_message(res.unwrap_err().as_ref());
    assert!(message.contains("already delivered"), "{message}");
    assert!(handle.is_settled());
    assert_eq!(runtime.core().tracker.num_calls(&Method::UnhandledPanic), 1);
    Ok(())
}

#[test]
fn test_background_computation_with_result() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");

    let handle = spawn(&owner, concurrent::run(|| 6 * 7).into_future());
    runtime.run_until(&handle)?;

    assert_eq!(handle.take_result()?, 42);
    Ok(())
}

#[test]
fn test_background_computation_without_result() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");

    let handle = spawn(&owner, {
        let journal = journal.clone();
        let done = concurrent::run(|| thread::sleep(Duration::from_millis(5)));
        async move {
            FutureAwaiter::new(done).await;
            journal.log("slept");
        }
    });
    runtime.run_until(&handle)?;

    assert!(handle.ready());
    assert_eq!(journal.entries(), ["slept"]);
    Ok(())
}

#[test]
fn test_promise_fulfilled_by_another_task() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let sender = Emitter::<String>::new("sender");
    let promise = Promise::<String>::new();
    let deferred = promise.deferred();

    let consumer = spawn(&owner, async move { deferred.await.len() });
    let _producer = spawn(&owner, {
        let event = EventAwaiter::new(&sender.object, &sender.signal);
        async move { promise.finish(event.await) }
    });

    sender.emit("hello".to_string());
    runtime.run_until(&consumer)?;

    assert_eq!(consumer.take_result()?, 5);
    Ok(())
}

#[test]
fn test_completed_deferred_does_not_suspend() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let promise = Promise::new();
    let deferred = promise.deferred();
    promise.finish('x');

    let handle = spawn(&owner, deferred.into_future());

    assert_eq!(handle.take_result()?, 'x');
    assert_eq!(runtime.num_tasks(), 0);
    Ok(())
}

#[test]
fn test_owner_destroyed_before_future_completes() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");
    let promise = Promise::<i32>::new();

    let handle = spawn(&owner, {
        let journal = journal.clone();
        let deferred = promise.deferred();
        async move {
            let _frame = journal.marker("task");
            let value = deferred.await;
            journal.log(format!("got {value}"));
        }
    });

    drop(owner);
    assert_eq!(journal.destroyed(), ["task"]);

    // The wake finds nothing to resume.
    promise.finish(1);
    runtime.run_pending()?;

    assert_eq!(journal.entries(), ["task created", "task destroyed"]);
    assert!(!handle.ready());
    assert_eq!(runtime.core().tracker.num_calls(&Method::Resume), 1);
    Ok(())
}

#[test]
fn test_owner_deleted_later_while_awaiting_background_computation() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let journal = Journal::default();
    let owner = Object::new("owner");

    let handle = spawn(&owner, {
        let journal = journal.clone();
        let computation = concurrent::run(|| {
            thread::sleep(Duration::from_millis(20));
            "done"
        });
        async move {
            let _frame = journal.marker("task");
            journal.log(computation.await);
        }
    });

    owner.delete_later();
    runtime.run_until(&handle)?;

    assert!(!handle.ready());
    assert_eq!(journal.entries(), ["task created", "task destroyed"]);
    Ok(())
}

#[test]
fn test_abandoned_promise_stalls_until_owner_destroyed() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");
    let promise = Promise::<()>::new();

    let handle = spawn(&owner, promise.deferred().into_future());
    drop(promise);
    runtime.run_pending()?;

    assert!(handle.is_running());

    owner.destroy();
    assert!(handle.is_settled());
    assert!(!handle.ready());
    Ok(())
}

struct Constant(u8);

impl crate::Completion for Constant {
    type Output = u8;

    fn is_completed(&self) -> bool {
        true
    }

    fn on_completed(&self, waker: std::task::Waker) {
        waker.wake();
    }

    fn value(&self) -> u8 {
        self.0
    }
}

#[test]
fn test_custom_completion_source() -> Result<()> {
    let runtime = init_local_runtime(None)?;
    let owner = Object::new("owner");

    let handle = spawn(&owner, FutureAwaiter::new(Constant(3)).into_future());

    assert_eq!(handle.take_result()?, 3);
    assert_eq!(runtime.num_tasks(), 0);
    Ok(())
}

use crate::runtime::SPILL_TO_HEAP_THRESHOLD;
use slab::Slab;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// A discrete, possibly repeating event source.
///
/// Receivers are plain closures. Emitting a signal invokes every receiver that
/// was connected when the emission started and is still connected when its
/// turn comes, so a receiver may safely disconnect itself, disconnect others
/// or connect new ones while the signal is being emitted.
///
/// `Signal` is a cheap handle: clones refer to the same set of receivers.
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T: 'static> {
    slots: RefCell<Slab<Slot<T>>>,

    // Slab keys are recycled, so every connection also remembers the
    // generation it was created with.
    generation: Cell<u64>,
}

struct Slot<T: 'static> {
    generation: u64,
    receiver: Rc<dyn Fn(T)>,
    once: bool,
}

impl<T: Clone + 'static> Signal<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SignalInner {
                slots: RefCell::new(Slab::new()),
                generation: Cell::new(0),
            }),
        }
    }

    /// Connects a receiver that is invoked on every emission until the
    /// returned [`Subscription`] is dropped.
    pub fn connect<F>(&self, receiver: F) -> Subscription
    where
        F: Fn(T) + 'static,
    {
        self.insert(Rc::new(receiver), false)
    }

    /// Connects a receiver that is invoked at most once. It is disconnected
    /// right before it runs, so later emissions are observed by no one.
    pub fn connect_once<F>(&self, receiver: F) -> Subscription
    where
        F: FnOnce(T) + 'static,
    {
        let receiver = Cell::new(Some(receiver));
        self.insert(
            Rc::new(move |value| {
                if let Some(receiver) = receiver.take() {
                    receiver(value);
                }
            }),
            true,
        )
    }

    /// Invokes the connected receivers with a clone of `value` each.
    pub fn emit(&self, value: T) {
        let pending = self
            .inner
            .slots
            .borrow()
            .iter()
            .map(|(key, slot)| (key, slot.generation, Rc::clone(&slot.receiver)))
            .collect::<SmallVec<[_; SPILL_TO_HEAP_THRESHOLD]>>();

        for (key, generation, receiver) in pending {
            // An earlier receiver may have disconnected this one.
            let removed = {
                let mut slots = self.inner.slots.borrow_mut();
                match slots.get(key) {
                    Some(slot) if slot.generation == generation => {
                        if slot.once {
                            Some(Some(slots.remove(key)))
                        } else {
                            Some(None)
                        }
                    }
                    _ => None,
                }
            };

            let Some(removed) = removed else {
                continue;
            };

            receiver(value.clone());
            drop(removed);
        }
    }

    /// Number of currently connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    /// Drops every receiver. Receivers are dropped outside of the slot borrow
    /// because their captures may own subscriptions to this very signal.
    pub(crate) fn disconnect_all(&self) {
        let drained = self
            .inner
            .slots
            .borrow_mut()
            .drain()
            .collect::<SmallVec<[_; SPILL_TO_HEAP_THRESHOLD]>>();
        drop(drained);
    }

    fn insert(&self, receiver: Rc<dyn Fn(T)>, once: bool) -> Subscription {
        let generation = self.inner.generation.get().wrapping_add(1);
        self.inner.generation.set(generation);

        let key = self.inner.slots.borrow_mut().insert(Slot {
            generation,
            receiver,
            once,
        });

        let source: Weak<dyn Disconnect> = Rc::downgrade(&self.inner) as Weak<SignalInner<T>>;

        Subscription {
            source: Some(source),
            key,
            generation,
        }
    }
}

impl<T: Clone + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("receivers", &self.inner.slots.borrow().len())
            .finish()
    }
}

trait Disconnect {
    fn disconnect(&self, key: usize, generation: u64);

    fn is_connected(&self, key: usize, generation: u64) -> bool;
}

impl<T: 'static> Disconnect for SignalInner<T> {
    fn disconnect(&self, key: usize, generation: u64) {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            match slots.get(key) {
                Some(slot) if slot.generation == generation => Some(slots.remove(key)),
                _ => None,
            }
        };
        drop(removed);
    }

    fn is_connected(&self, key: usize, generation: u64) -> bool {
        self.slots
            .borrow()
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
    }
}

/// A live connection between a [`Signal`] and one receiver.
///
/// Dropping the subscription disconnects the receiver. Use
/// [`Subscription::detach`] to keep the receiver connected for as long as the
/// signal exists.
#[must_use = "dropping a Subscription disconnects its receiver"]
pub struct Subscription {
    source: Option<Weak<dyn Disconnect>>,
    key: usize,
    generation: u64,
}

impl Subscription {
    /// A subscription that is not connected to anything.
    pub fn empty() -> Self {
        Self {
            source: None,
            key: 0,
            generation: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.source
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|source| source.is_connected(self.key, self.generation))
    }

    /// Releases the token without disconnecting the receiver.
    pub fn detach(mut self) {
        self.source.take();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(source) = self.source.take().and_then(|source| source.upgrade()) {
            source.disconnect(self.key, self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use static_assertions::assert_not_impl_any;

    assert_not_impl_any!(Signal<i32>: Send, Sync);
    assert_not_impl_any!(Subscription: Send, Sync);

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(T) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |value| sink.borrow_mut().push(value))
    }

    #[test]
    fn test_emit_reaches_every_receiver() {
        let signal = Signal::<(i32, String)>::new();
        let (first, receiver) = recorder();
        let _a = signal.connect(receiver);
        let (second, receiver) = recorder();
        let _b = signal.connect(receiver);

        signal.emit((2, "2".to_string()));

        assert_eq!(*first.borrow(), vec![(2, "2".to_string())]);
        assert_eq!(*second.borrow(), vec![(2, "2".to_string())]);
    }

    #[test]
    fn test_dropping_subscription_disconnects() {
        let signal = Signal::<i32>::new();
        let (seen, receiver) = recorder();
        let subscription = signal.connect(receiver);
        assert!(subscription.is_connected());

        signal.emit(1);
        drop(subscription);
        signal.emit(2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(signal.receiver_count(), 0);
    }

    #[test]
    fn test_detached_subscription_stays_connected() {
        let signal = Signal::<i32>::new();
        let (seen, receiver) = recorder();
        signal.connect(receiver).detach();

        signal.emit(7);
        signal.emit(8);

        assert_eq!(*seen.borrow(), vec![7, 8]);
    }

    #[rstest]
    #[case::one(1)]
    #[case::two(2)]
    #[case::five(5)]
    fn test_connect_once_observes_only_first_emission(#[case] emissions: i32) {
        let signal = Signal::<i32>::new();
        let (seen, receiver) = recorder();
        let subscription = signal.connect_once(receiver);

        for value in 0..emissions {
            signal.emit(value);
        }

        assert_eq!(*seen.borrow(), vec![0]);
        assert!(!subscription.is_connected());
    }

    #[test]
    fn test_receiver_disconnecting_a_later_receiver() {
        let signal = Signal::<()>::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let killer = {
            let victim = Rc::clone(&victim);
            signal.connect(move |()| {
                victim.borrow_mut().take();
            })
        };

        let (seen, receiver) = recorder();
        victim.replace(Some(signal.connect(receiver)));

        signal.emit(());

        assert!(seen.borrow().is_empty());
        assert_eq!(signal.receiver_count(), 1);
        drop(killer);
    }

    #[test]
    fn test_recycled_key_is_not_disconnected_by_stale_subscription() {
        let signal = Signal::<i32>::new();
        let (_, receiver) = recorder();
        let stale = signal.connect_once(receiver);
        signal.emit(0);

        let (seen, receiver) = recorder();
        let _fresh = signal.connect(receiver);
        drop(stale);
        signal.emit(1);

        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn test_subscription_outliving_signal() {
        let signal = Signal::<i32>::new();
        let subscription = signal.connect(|_| {});
        drop(signal);

        assert!(!subscription.is_connected());
        drop(subscription);
        assert!(!Subscription::empty().is_connected());
    }
}

//! Observable application state.
//!
//! Single-threaded cooperative model: all mutation and notification happens on
//! one event loop, so interior mutability is `RefCell`, not a lock. The handle
//! is cheap to clone and passed explicitly to consumers; there are no global
//! singletons.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A slice that supports merge-updates through a typed patch.
pub trait Patchable {
    type Patch: Default;

    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// Handle returned by [`ObservableState::register`], used to unregister.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

type Callback<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<(SubscriberId, Callback<T>)>>,
    next_id: Cell<u64>,
}

/// Holds one slice of application state and notifies subscribers
/// synchronously after each committed change.
pub struct ObservableState<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for ObservableState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Patchable + Clone> ObservableState<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(initial),
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Current value, by clone. Callers never see an aliasable reference to
    /// the internal value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Merge `patch` into the current value, then notify every subscriber
    /// with the new full value.
    pub fn update(&self, patch: &T::Patch) {
        self.inner.value.borrow_mut().apply_patch(patch);
        self.notify();
    }

    /// Discard the previous value entirely and notify.
    pub fn replace(&self, full: T) {
        *self.inner.value.borrow_mut() = full;
        self.notify();
    }

    /// Register a subscriber. Invocation order across subscribers is not
    /// guaranteed.
    pub fn register(&self, f: impl Fn(&T) + 'static) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Returns `false` if the id was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subs = self.inner.subscribers.borrow_mut();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    fn notify(&self) {
        // Snapshot the callback list first: a subscriber may register or
        // unregister (on this slice or another) while being invoked.
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| Rc::clone(f))
            .collect();
        let value = self.inner.value.borrow().clone();
        for f in callbacks {
            f(&value);
        }
    }
}

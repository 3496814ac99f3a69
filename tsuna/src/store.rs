//! Reactive state container.
//!
//! [`Store`] holds an immutable snapshot (`Arc<S>`) that is replaced wholesale
//! on every transition. Readers clone the snapshot and never observe a
//! partially applied update. Writers are serialized by a single writer lock;
//! listeners are notified in registration order while that lock is held, so
//! every subscriber sees the same total order of states.
//!
//! A listener may call [`Store::set_state`] again. Such re-entrant updates are
//! queued and applied right after the current notification round finishes.
//!
//! # Example
//!
//! ```rust,ignore
//! use tsuna::store::Store;
//!
//! let store = Store::new(0_u64);
//! let _sub = store.subscribe(|next, prev| println!("{prev} -> {next}"));
//! store.set_state(|n| n + 1);
//! assert_eq!(*store.get_state(), 1);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

/// Listener invoked with `(next, previous)` snapshots.
pub type Listener<S> = Arc<dyn Fn(&Arc<S>, &Arc<S>) + Send + Sync>;

/// Equality function used by selector subscriptions.
pub type EqualityFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

type Updater<S> = Box<dyn FnOnce(&S) -> S + Send>;

/// Options for [`Store::subscribe_with_selector`].
pub struct SelectorOptions<T> {
    /// Custom equality for the selected slice. Defaults to `PartialEq`.
    pub equality: Option<EqualityFn<T>>,
    /// Invoke the listener once with the current slice on subscription.
    pub fire_immediately: bool,
}

impl<T> Default for SelectorOptions<T> {
    fn default() -> Self {
        Self {
            equality: None,
            fire_immediately: false,
        }
    }
}

impl<T> fmt::Debug for SelectorOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorOptions")
            .field("custom_equality", &self.equality.is_some())
            .field("fire_immediately", &self.fire_immediately)
            .finish()
    }
}

impl<T> SelectorOptions<T> {
    /// Use a custom equality function.
    #[must_use]
    pub fn equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(equality));
        self
    }

    /// Fire the listener immediately with the current slice.
    #[must_use]
    pub const fn fire_immediately(mut self) -> Self {
        self.fire_immediately = true;
        self
    }
}

trait ListenerSet: Send + Sync {
    fn remove(&self, id: u64);
}

struct Inner<S> {
    state: RwLock<Arc<S>>,
    writer: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
    pending: Mutex<VecDeque<Updater<S>>>,
    listeners: RwLock<Vec<(u64, Listener<S>)>>,
    next_id: AtomicU64,
}

impl<S: Send + Sync + 'static> ListenerSet for Inner<S> {
    fn remove(&self, id: u64) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }
}

/// Clears the re-entrancy owner even if a listener panics.
struct OwnerGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Single-writer reactive state container.
///
/// Cloning a `Store` yields another handle to the same state.
pub struct Store<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.read())
            .field("listener_count", &self.inner.listeners.read().len())
            .finish_non_exhaustive()
    }
}

impl<S> Store<S>
where
    S: PartialEq + Send + Sync + 'static,
{
    /// Create a store with an initial state.
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(Arc::new(initial)),
                writer: Mutex::new(()),
                owner: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.inner.state.read())
    }

    /// Apply `updater` to the current state and publish the result.
    ///
    /// Updates from different threads are applied one at a time in lock
    /// acquisition order. An updater that returns a state equal to the
    /// current one publishes nothing and notifies no one.
    pub fn set_state<F>(&self, updater: F)
    where
        F: FnOnce(&S) -> S + Send + 'static,
    {
        let me = thread::current().id();
        {
            let owner = self.inner.owner.lock();
            if *owner == Some(me) {
                // Called from a listener of the round in progress.
                self.inner.pending.lock().push_back(Box::new(updater));
                return;
            }
        }

        let _writer = self.inner.writer.lock();
        *self.inner.owner.lock() = Some(me);
        let _owner = OwnerGuard(&self.inner.owner);

        self.apply(updater);
        loop {
            let next = self.inner.pending.lock().pop_front();
            match next {
                Some(updater) => self.apply(updater),
                None => break,
            }
        }
    }

    /// Replace the whole state.
    pub fn replace_state(&self, state: S) {
        self.set_state(move |_| state);
    }

    fn apply(&self, updater: impl FnOnce(&S) -> S) {
        let previous = self.get_state();
        let next = updater(&previous);
        if next == *previous {
            return;
        }
        let next = Arc::new(next);
        *self.inner.state.write() = Arc::clone(&next);

        let listeners: Vec<Listener<S>> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&next, &previous);
        }
    }

    /// Register a listener for every state change.
    ///
    /// The listener stays registered for as long as the returned
    /// [`Subscription`] is alive (or forever after [`Subscription::detach`]).
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<S>, &Arc<S>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, Arc::new(listener)));
        let inner: Arc<dyn ListenerSet> = Arc::<Inner<S>>::clone(&self.inner);
        Subscription {
            id,
            set: Some(Arc::downgrade(&inner)),
        }
    }

    /// Register a listener that only fires when a selected slice changes.
    ///
    /// `selector` derives a value from each new state; `listener` receives
    /// `(next, previous)` slices whenever they differ under the configured
    /// equality (plain `PartialEq` by default).
    pub fn subscribe_with_selector<T, Sel, L>(
        &self,
        selector: Sel,
        listener: L,
        options: SelectorOptions<T>,
    ) -> Subscription
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        let equality: EqualityFn<T> = options
            .equality
            .unwrap_or_else(|| Arc::new(|a: &T, b: &T| a == b));
        let current = selector(&self.get_state());
        if options.fire_immediately {
            listener(&current, &current);
        }
        let slot = Mutex::new(current);

        self.subscribe(move |state, _previous| {
            let next = selector(state);
            let mut current = slot.lock();
            if equality(&current, &next) {
                return;
            }
            let previous = std::mem::replace(&mut *current, next.clone());
            drop(current);
            listener(&next, &previous);
        })
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

/// Handle to a registered listener; unsubscribes on drop.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    set: Option<Weak<dyn ListenerSet>>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener registered for the lifetime of the store.
    pub fn detach(mut self) {
        self.set = None;
    }

    fn remove(&mut self) {
        if let Some(set) = self.set.take().and_then(|w| w.upgrade()) {
            set.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.set.is_some())
            .finish()
    }
}

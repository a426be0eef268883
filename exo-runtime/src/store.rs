//! Observable record of the current state and store.
//!
//! Writes that leave the record equal to its previous value are dropped;
//! every other write notifies all subscribers with a cloned snapshot.

use exo_compiler::StateRef;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Bounds required of a machine's store value.
pub trait Store: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> Store for T {}

/// Immutable view delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<S> {
    /// Current state as `machine.state`; empty before the initial transition.
    pub state: String,
    pub store: S,
}

/// The live record owned by a machine.
pub(crate) struct Current<S> {
    pub state: Option<StateRef>,
    pub store: S,
}

type Listener<S> = Arc<dyn Fn(&Snapshot<S>) + Send + Sync>;

/// Registered change listeners.
pub(crate) struct Subscribers<S> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<S>)>>,
}

impl<S> Subscribers<S> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Listener<S>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Calls every listener outside the lock, so listeners may subscribe or
    /// unsubscribe while being notified.
    pub fn notify(&self, snapshot: &Snapshot<S>) {
        let listeners: Vec<Listener<S>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Handle returned by `subscribe`.
pub struct Subscription<S> {
    id: u64,
    subscribers: Weak<Subscribers<S>>,
}

impl<S> Subscription<S> {
    pub(crate) fn new(id: u64, subscribers: &Arc<Subscribers<S>>) -> Self {
        Self {
            id,
            subscribers: Arc::downgrade(subscribers),
        }
    }

    /// Stops further notifications. Returns false if already removed.
    pub fn unsubscribe(self) -> bool {
        match self.subscribers.upgrade() {
            Some(subscribers) => subscribers.remove(self.id),
            None => false,
        }
    }
}

impl<S> std::fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_reaches_every_listener() {
        let subscribers = Arc::new(Subscribers::<u32>::new());
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            subscribers.add(Arc::new(move |_: &Snapshot<u32>| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        subscribers.notify(&Snapshot {
            state: "m.a".to_string(),
            store: 0,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe_once() {
        let subscribers = Arc::new(Subscribers::<u32>::new());
        let id = subscribers.add(Arc::new(|_: &Snapshot<u32>| {}));
        let subscription = Subscription::new(id, &subscribers);
        assert_eq!(subscribers.len(), 1);
        assert!(subscription.unsubscribe());
        assert_eq!(subscribers.len(), 0);
        assert!(!Subscription::new(id, &subscribers).unsubscribe());
    }
}

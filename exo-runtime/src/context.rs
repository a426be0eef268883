//! Handle given to handlers and to the setup callback.

use crate::error::RuntimeError;
use crate::machine::Inner;
use crate::store::{Snapshot, Store};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

/// Access to the machine a handler runs in.
///
/// Holds a weak reference: once the machine is dropped every call fails with
/// [`RuntimeError::Dropped`]. During setup the machine does not exist yet, so
/// calls made from the setup callback itself fail the same way.
pub struct MachineContext<S> {
    inner: Weak<Inner<S>>,
}

impl<S> MachineContext<S> {
    pub(crate) fn new(inner: Weak<Inner<S>>) -> Self {
        Self { inner }
    }
}

impl<S: Store> MachineContext<S> {
    fn upgrade(&self) -> Result<Arc<Inner<S>>, RuntimeError> {
        self.inner.upgrade().ok_or(RuntimeError::Dropped)
    }

    /// Transitions to `target` (`state`, `.state` or `machine.state`).
    pub fn goto(&self, target: &str) -> Result<(), RuntimeError> {
        self.upgrade()?.goto(target)
    }

    /// Dispatches an event, returning whether the state changed.
    pub async fn send(&self, event: &str, payload: Value) -> Result<bool, RuntimeError> {
        let inner = self.upgrade()?;
        inner.send(event, payload).await
    }

    pub fn store(&self) -> Result<S, RuntimeError> {
        Ok(self.upgrade()?.store())
    }

    /// Applies `f` to a copy of the store and commits it if it changed.
    pub fn update_store(&self, f: impl FnOnce(&mut S)) -> Result<bool, RuntimeError> {
        Ok(self.upgrade()?.update_store(f))
    }

    pub fn set_store(&self, store: S) -> Result<bool, RuntimeError> {
        Ok(self.upgrade()?.update_store(move |current| *current = store))
    }

    pub fn snapshot(&self) -> Result<Snapshot<S>, RuntimeError> {
        Ok(self.upgrade()?.snapshot())
    }

    /// Current state as `machine.state`.
    pub fn state(&self) -> Result<String, RuntimeError> {
        Ok(self.upgrade()?.snapshot().state)
    }
}

impl<S> Clone for MachineContext<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for MachineContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineContext")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

//! Transition engine.
//!
//! A [`Machine`] owns a compiled forest, the current state and store, the
//! armed wait timers and the subscriber list. Locks are held only for short
//! reads and writes and never while a handler runs.
//!
//! Hooks (`@enter`, `@exit`, `@done` and elapsed waits) are started by polling
//! their future once on the calling thread. Work a hook does before its first
//! suspension point, including nested `goto` chains, therefore completes
//! before the triggering call returns, and an error raised there is returned
//! to that caller. A hook that suspends finishes as a spawned task; errors it
//! raises later are logged and published on [`Machine::errors`].

use crate::callback::Callback;
use crate::context::MachineContext;
use crate::error::RuntimeError;
use crate::options::MachineOptions;
use crate::store::{Current, Snapshot, Store, Subscribers, Subscription};
use crate::trace::{TraceEvent, Tracer};
use exo_compiler::{compile_str, Forest, Lifecycle, StateNode, StateRef, Trigger};
use futures::future::join_all;
use futures::task::noop_waker_ref;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the detached-error channel.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Machine name and state name that resolve to the main machine and a
/// machine's initial state.
const MAIN: &str = "main";
const INITIAL: &str = "initial";

pub(crate) struct Inner<S> {
    forest: Forest<Callback<S>>,
    current: Mutex<Current<S>>,
    /// Done flag per machine index.
    done: Mutex<Vec<bool>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    subscribers: Arc<Subscribers<S>>,
    errors: broadcast::Sender<Arc<RuntimeError>>,
    handle: Handle,
    debug: bool,
    tracer: Arc<dyn Tracer>,
}

impl<S: Store> Inner<S> {
    fn new(forest: Forest<Callback<S>>, store: S, options: &MachineOptions, handle: Handle) -> Self {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            done: Mutex::new(vec![false; forest.len()]),
            forest,
            current: Mutex::new(Current { state: None, store }),
            timers: Mutex::new(Vec::new()),
            subscribers: Arc::new(Subscribers::new()),
            errors,
            handle,
            debug: options.debug,
            tracer: options.tracer(),
        }
    }

    /// Performs the initial transition into `main.initial`.
    fn start(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let main = self
            .forest
            .main_machine()
            .ok_or(RuntimeError::NoMainMachine)?;
        if main.initial_index().is_none() {
            return Err(RuntimeError::NoInitialState {
                machine: main.name.clone(),
            });
        }
        tracing::debug!(
            machine = %main.name,
            machines = self.forest.len(),
            "starting statechart"
        );
        self.goto(&format!("{}.{}", MAIN, INITIAL))
    }

    pub(crate) fn goto(self: &Arc<Self>, target: &str) -> Result<(), RuntimeError> {
        let from = self.current.lock().state;
        let to = self.resolve(target, from)?;
        let to = self.follow_aliases(target, to)?;
        self.transition(from, to)
    }

    /// Resolves `machine.state`, `.state` or a bare `state` name.
    fn resolve(&self, target: &str, current: Option<StateRef>) -> Result<StateRef, RuntimeError> {
        let unresolved = || RuntimeError::UnresolvedTarget {
            target: target.to_string(),
        };
        let current_machine = current.map(|at| at.machine);

        let (machine, state) = match target.split_once('.') {
            Some(("", state)) => (current_machine.or(self.forest.main), state),
            Some((MAIN, state)) => (self.forest.main, state),
            Some((machine, state)) => (self.forest.machine_index(machine), state),
            None => {
                // Bare names prefer the current machine and fall back to main.
                if let Some(machine) = current_machine {
                    if let Some(state) = self.state_index(machine, target) {
                        return Ok(StateRef::new(machine, state));
                    }
                }
                (self.forest.main, target)
            }
        };

        let machine = machine.ok_or_else(unresolved)?;
        let state = self.state_index(machine, state).ok_or_else(unresolved)?;
        Ok(StateRef::new(machine, state))
    }

    fn state_index(&self, machine: usize, state: &str) -> Option<usize> {
        let node = self.forest.machines.get(machine)?;
        if state == INITIAL {
            node.initial_index()
        } else {
            node.state_index(state)
        }
    }

    /// Replaces alias states by the initial state of the machine they name.
    fn follow_aliases(&self, target: &str, mut at: StateRef) -> Result<StateRef, RuntimeError> {
        for _ in 0..=self.forest.len() {
            let Some(machine) = self.node(at)?.immediate else {
                return Ok(at);
            };
            let node = self
                .forest
                .machines
                .get(machine)
                .ok_or_else(|| RuntimeError::UnresolvedTarget {
                    target: target.to_string(),
                })?;
            let state = node
                .initial_index()
                .ok_or_else(|| RuntimeError::NoInitialState {
                    machine: node.name.clone(),
                })?;
            at = StateRef::new(machine, state);
        }
        Err(RuntimeError::AliasCycle {
            target: target.to_string(),
        })
    }

    fn transition(self: &Arc<Self>, from: Option<StateRef>, to: StateRef) -> Result<(), RuntimeError> {
        let state = self.node(to)?;
        let machine_name = self.machine_name(to);

        if let Some(from) = from {
            let previous = self.node(from)?;
            self.trace(TraceEvent::Exit {
                machine: self.machine_name(from),
                state: &previous.name,
            });
            if let Some(hook) = previous.lifecycle(Lifecycle::Exit) {
                self.start_hook(self.label(from, &hook.trigger), &hook.callback, Value::Null)?;
            }
        }

        if from.map(|at| at.machine) != Some(to.machine) {
            self.trace(TraceEvent::MachineSwitch {
                from: from.map(|at| self.machine_name(at)),
                to: machine_name,
            });
        }

        self.commit_state(to);
        self.trace(TraceEvent::Enter {
            machine: machine_name,
            state: &state.name,
            initial: state.initial,
        });
        if let Some(hook) = state.lifecycle(Lifecycle::Enter) {
            self.start_hook(self.label(to, &hook.trigger), &hook.callback, Value::Null)?;
        }

        // An enter hook that already moved on has armed the timers of the
        // state it moved to; the waits of `to` no longer apply.
        if self.current.lock().state == Some(to) {
            self.arm_timers(to, state);
        }

        if let Some(flag) = self.done.lock().get_mut(to.machine) {
            *flag = state.is_final;
        }
        if state.is_final {
            self.trace(TraceEvent::Done {
                machine: machine_name,
            });
            let machine = &self.forest.machines[to.machine];
            if let Some(hook) = machine.lifecycle(Lifecycle::Done) {
                self.start_hook(
                    format!("{} {}", machine.name, hook.trigger),
                    &hook.callback,
                    Value::Null,
                )?;
            }
        }

        Ok(())
    }

    /// Polls a hook once and spawns the remainder if it suspends.
    fn start_hook(self: &Arc<Self>, label: String, callback: &Callback<S>, payload: Value) -> Result<(), RuntimeError> {
        let mut future = callback.call(MachineContext::new(Arc::downgrade(self)), payload);

        let _runtime = self.handle.enter();
        let mut cx = Context::from_waker(noop_waker_ref());
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(())) => Ok(()),
            Poll::Ready(Err(err)) => Err(RuntimeError::from_handler(&label, err)),
            Poll::Pending => {
                let weak = Arc::downgrade(self);
                self.handle.spawn(async move {
                    if let Err(err) = future.await {
                        let err = RuntimeError::from_handler(&label, err);
                        match weak.upgrade() {
                            Some(inner) => inner.report(err),
                            None => tracing::error!(error = %err, "handler failed after machine was dropped"),
                        }
                    }
                });
                Ok(())
            }
        }
    }

    fn arm_timers(self: &Arc<Self>, at: StateRef, state: &StateNode<Callback<S>>) {
        let mut armed = Vec::new();
        for (delay, handler) in state.wait_handlers() {
            let weak = Arc::downgrade(self);
            let callback = handler.callback.clone();
            let label = self.label(at, &handler.trigger);
            armed.push(self.handle.spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(inner) = weak.upgrade() {
                    inner.wait_elapsed(at, delay, label, &callback);
                }
            }));
        }
        if armed.is_empty() {
            return;
        }

        let mut timers = self.timers.lock();
        timers.retain(|timer| !timer.is_finished());
        timers.extend(armed);
    }

    fn wait_elapsed(self: &Arc<Self>, at: StateRef, delay: std::time::Duration, label: String, callback: &Callback<S>) {
        if let Ok(state) = self.node(at) {
            self.trace(TraceEvent::WaitElapsed {
                machine: self.machine_name(at),
                state: &state.name,
                delay,
            });
        }
        // The handler outlives this timer: a later cancel cannot interrupt it.
        if let Err(err) = self.start_hook(label, callback, Value::Null) {
            self.report(err);
        }
    }

    fn cancel_timers(&self) {
        let timers: Vec<JoinHandle<()>> = self.timers.lock().drain(..).collect();
        let pending = timers.iter().filter(|timer| !timer.is_finished()).count();
        for timer in timers {
            timer.abort();
        }
        if pending > 0 {
            tracing::trace!(cancelled = pending, "cancelled wait timers");
        }
    }

    fn pending_timers(&self) -> usize {
        self.timers
            .lock()
            .iter()
            .filter(|timer| !timer.is_finished())
            .count()
    }

    pub(crate) async fn send(self: &Arc<Self>, event: &str, payload: Value) -> Result<bool, RuntimeError> {
        self.cancel_timers();

        let before = self.current.lock().state;
        let Some(at) = before else {
            return Ok(false);
        };

        let handlers: Vec<(String, Callback<S>)> = self
            .node(at)?
            .event_handlers(event)
            .map(|handler| (self.label(at, &handler.trigger), handler.callback.clone()))
            .collect();
        if handlers.is_empty() {
            tracing::debug!(event, state = %self.forest.path(at), "no handler for event");
            return Ok(false);
        }

        let ctx = MachineContext::new(Arc::downgrade(self));
        let running = handlers.into_iter().map(|(label, callback)| {
            let future = callback.call(ctx.clone(), payload.clone());
            async move {
                future
                    .await
                    .map_err(|err| RuntimeError::from_handler(&label, err))
            }
        });
        // Every started handler runs to completion; the first error in
        // declaration order is returned afterwards.
        join_all(running)
            .await
            .into_iter()
            .collect::<Result<Vec<()>, RuntimeError>>()?;

        let after = self.current.lock().state;
        Ok(after != before)
    }

    fn commit_state(&self, at: StateRef) -> bool {
        let snapshot = {
            let mut current = self.current.lock();
            if current.state == Some(at) {
                return false;
            }
            current.state = Some(at);
            self.snapshot_of(&current)
        };
        self.subscribers.notify(&snapshot);
        true
    }

    pub(crate) fn update_store(&self, f: impl FnOnce(&mut S)) -> bool {
        // Mutate a copy outside the lock so `f` may call back into the machine.
        let mut next = self.current.lock().store.clone();
        f(&mut next);

        let snapshot = {
            let mut current = self.current.lock();
            if current.store == next {
                return false;
            }
            current.store = next;
            self.snapshot_of(&current)
        };
        self.subscribers.notify(&snapshot);
        true
    }

    pub(crate) fn store(&self) -> S {
        self.current.lock().store.clone()
    }

    pub(crate) fn snapshot(&self) -> Snapshot<S> {
        self.snapshot_of(&self.current.lock())
    }

    fn snapshot_of(&self, current: &Current<S>) -> Snapshot<S> {
        Snapshot {
            state: current
                .state
                .map(|at| self.forest.path(at))
                .unwrap_or_default(),
            store: current.store.clone(),
        }
    }

    fn report(&self, err: RuntimeError) {
        tracing::error!(error = %err, code = err.error_code(), "detached handler failed");
        // No receivers is fine: the error has been logged.
        let _ = self.errors.send(Arc::new(err));
    }

    fn node(&self, at: StateRef) -> Result<&StateNode<Callback<S>>, RuntimeError> {
        self.forest
            .state(at)
            .ok_or_else(|| RuntimeError::UnresolvedTarget {
                target: self.forest.path(at),
            })
    }

    fn machine_name(&self, at: StateRef) -> &str {
        self.forest
            .machines
            .get(at.machine)
            .map(|m| m.name.as_str())
            .unwrap_or_default()
    }

    fn label(&self, at: StateRef, trigger: &Trigger) -> String {
        format!("{} {}", self.forest.path(at), trigger)
    }

    fn trace(&self, event: TraceEvent<'_>) {
        if self.debug {
            self.tracer.trace(&event);
        }
    }
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().drain(..) {
            timer.abort();
        }
    }
}

/// A running statechart instance.
pub struct Machine<S> {
    inner: Arc<Inner<S>>,
}

impl<S: Store> Machine<S> {
    /// Builds the forest with `setup` and enters `main.initial`.
    ///
    /// Must be called inside a tokio runtime; wait timers and suspended hooks
    /// are spawned onto it.
    pub fn new<F>(options: MachineOptions, store: S, setup: F) -> Result<Self, RuntimeError>
    where
        F: FnOnce(MachineContext<S>) -> Result<Forest<Callback<S>>, RuntimeError>,
    {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoAsyncRuntime)?;

        let mut setup_error = None;
        let inner = Arc::new_cyclic(|weak| {
            let forest = match setup(MachineContext::new(weak.clone())) {
                Ok(forest) => forest,
                Err(err) => {
                    setup_error = Some(err);
                    Forest::default()
                }
            };
            Inner::new(forest, store, &options, handle)
        });
        if let Some(err) = setup_error {
            return Err(err);
        }

        inner.start()?;
        Ok(Self { inner })
    }

    /// Compiles `source` against `callbacks` and starts the machine.
    pub fn from_source(
        options: MachineOptions,
        store: S,
        source: &str,
        callbacks: Vec<Callback<S>>,
    ) -> Result<Self, RuntimeError> {
        Self::new(options, store, |_| Ok(compile_str(source, callbacks)?))
    }

    /// Dispatches an event to the current state.
    ///
    /// Cancels every armed wait timer first, then runs all matching handlers
    /// (exact and wildcard) concurrently. Every handler runs to completion; if
    /// any failed, the first error in declaration order is returned. Otherwise
    /// returns whether the state changed.
    pub async fn send(&self, event: &str, payload: Value) -> Result<bool, RuntimeError> {
        self.inner.send(event, payload).await
    }

    /// Transitions directly. Armed wait timers are left running.
    pub fn goto(&self, target: &str) -> Result<(), RuntimeError> {
        self.inner.goto(target)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription<S>
    where
        F: Fn(&Snapshot<S>) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.add(Arc::new(listener));
        tracing::trace!(subscribers = self.inner.subscribers.len(), "subscribed");
        Subscription::new(id, &self.inner.subscribers)
    }

    pub fn snapshot(&self) -> Snapshot<S> {
        self.inner.snapshot()
    }

    /// Current state as `machine.state`.
    pub fn state(&self) -> String {
        self.inner.snapshot().state
    }

    pub fn store(&self) -> S {
        self.inner.store()
    }

    /// Applies `f` to a copy of the store; notifies only if the value changed.
    pub fn update_store(&self, f: impl FnOnce(&mut S)) -> bool {
        self.inner.update_store(f)
    }

    pub fn set_store(&self, store: S) -> bool {
        self.inner.update_store(move |current| *current = store)
    }

    /// Whether the named machine has entered a final state.
    pub fn is_done(&self, machine: &str) -> Option<bool> {
        let index = self.inner.forest.machine_index(machine)?;
        self.inner.done.lock().get(index).copied()
    }

    pub fn context(&self) -> MachineContext<S> {
        MachineContext::new(Arc::downgrade(&self.inner))
    }

    /// Errors raised by hooks after they suspended.
    pub fn errors(&self) -> broadcast::Receiver<Arc<RuntimeError>> {
        self.inner.errors.subscribe()
    }

    /// Number of armed wait timers that have not fired.
    pub fn pending_timers(&self) -> usize {
        self.inner.pending_timers()
    }

    pub fn forest(&self) -> &Forest<Callback<S>> {
        &self.inner.forest
    }
}

impl<S> Clone for Machine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store + std::fmt::Debug> std::fmt::Debug for Machine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

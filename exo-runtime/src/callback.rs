//! Handler callbacks bound into a compiled forest.

use crate::context::MachineContext;
use crate::store::Store;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of running a handler.
pub type HandlerResult = Result<(), HandlerError>;

type HandlerFn<S> =
    dyn Fn(MachineContext<S>, Value) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A shareable handler. Receives the machine context and the event payload
/// (`null` for lifecycle and wait handlers).
pub struct Callback<S>(Arc<HandlerFn<S>>);

impl<S: 'static> Callback<S> {
    /// Wraps an async handler.
    pub fn new<H, Fut>(handler: H) -> Self
    where
        H: Fn(MachineContext<S>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(move |ctx, payload| handler(ctx, payload).boxed()))
    }

    /// Wraps a synchronous handler.
    pub fn from_fn<H>(handler: H) -> Self
    where
        H: Fn(&MachineContext<S>, Value) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(move |ctx, payload| {
            future::ready(handler(&ctx, payload)).boxed()
        }))
    }

    /// A handler that does nothing.
    pub fn noop() -> Self {
        Self::from_fn(|_, _| Ok(()))
    }

    pub(crate) fn call(&self, ctx: MachineContext<S>, payload: Value) -> BoxFuture<'static, HandlerResult> {
        (self.0)(ctx, payload)
    }
}

impl<S: Store> Callback<S> {
    /// Moves the machine to `target` when invoked.
    pub fn goto(target: impl Into<String>) -> Self {
        let target = target.into();
        Self::from_fn(move |ctx, _| {
            ctx.goto(&target)?;
            Ok(())
        })
    }
}

impl<S> Clone for Callback<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S> fmt::Debug for Callback<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

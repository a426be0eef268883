//! # exo-runtime
//!
//! Statechart runtime for exo.
//!
//! This crate provides:
//! - The transition engine driving a compiled forest
//! - An observable state/store record with change subscriptions
//! - Wait timers and lifecycle hooks on tokio
//! - Pluggable debug tracing
//!
//! ```no_run
//! use exo_runtime::{Callback, Machine, MachineOptions};
//! use serde_json::{json, Value};
//!
//! # async fn demo() -> Result<(), exo_runtime::RuntimeError> {
//! let machine = Machine::from_source(
//!     MachineOptions::default(),
//!     json!({}),
//!     "main machine m { initial state idle { on:GO ${0} } state running {} }",
//!     vec![Callback::goto("running")],
//! )?;
//! machine.send("GO", Value::Null).await?;
//! assert_eq!(machine.state(), "m.running");
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod context;
pub mod error;
pub mod machine;
pub mod options;
pub mod store;
pub mod trace;

pub use callback::{Callback, HandlerError, HandlerResult};
pub use context::MachineContext;
pub use error::RuntimeError;
pub use machine::Machine;
pub use options::MachineOptions;
pub use store::{Snapshot, Store, Subscription};
pub use trace::{LogTracer, TraceEvent, Tracer};

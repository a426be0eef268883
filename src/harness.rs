//! Harness configuration for `exo run`.
//!
//! A harness names a statechart source file and binds each of its `${N}`
//! slots to a scripted action. Configuration is loaded in the following
//! order (later overrides earlier):
//! 1. Default values
//! 2. YAML harness file (given on the command line or via EXO_HARNESS)
//! 3. Environment variables (EXO_DEBUG)

use exo_runtime::{Callback, HandlerError, HandlerResult, Machine, MachineContext, MachineOptions, RuntimeError};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Statechart source, relative to the harness file.
    pub source: PathBuf,
    /// Emit transition traces.
    pub debug: bool,
    /// Initial store value.
    pub store: Value,
    /// Actions bound to `${0}`, `${1}`, ... in order.
    pub slots: Vec<Action>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("machine.exo"),
            debug: false,
            store: json!({}),
            slots: Vec::new(),
        }
    }
}

/// A scripted slot action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Transition to a target state.
    Goto(String),
    /// Dispatch another event.
    Send {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// Set a store field; without a value the event payload is stored.
    Set {
        key: String,
        #[serde(default)]
        value: Option<Value>,
    },
    /// Log a message at info level.
    Log(String),
    /// Run actions one after another.
    Sequence(Vec<Action>),
}

impl Action {
    fn run<'a>(&'a self, ctx: &'a MachineContext<Value>, payload: Value) -> BoxFuture<'a, HandlerResult> {
        async move {
            match self {
                Action::Goto(target) => ctx.goto(target)?,
                Action::Send {
                    event,
                    payload: outgoing,
                } => {
                    ctx.send(event, outgoing.clone()).await?;
                }
                Action::Set { key, value } => {
                    let value = value.clone().unwrap_or(payload);
                    ctx.update_store(|store| {
                        if !store.is_object() {
                            *store = json!({});
                        }
                        store[key.as_str()] = value;
                    })?;
                }
                Action::Log(message) => {
                    let state = ctx.state()?;
                    tracing::info!(target: "exo::harness", state = %state, "{}", message);
                }
                Action::Sequence(actions) => {
                    for action in actions {
                        action.run(ctx, payload.clone()).await?;
                    }
                }
            }
            Ok::<(), HandlerError>(())
        }
        .boxed()
    }

    /// Wraps the action as a machine callback.
    pub fn into_callback(self) -> Callback<Value> {
        let action = Arc::new(self);
        Callback::new(move |ctx, payload| {
            let action = Arc::clone(&action);
            async move { action.run(&ctx, payload).await }
        })
    }
}

impl HarnessConfig {
    /// Loads the harness named by EXO_HARNESS, then applies overrides.
    pub fn load() -> Result<Self, HarnessError> {
        let path = std::env::var("EXO_HARNESS").map_err(|_| {
            HarnessError::ValidationError("no harness given and EXO_HARNESS is not set".to_string())
        })?;
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads a harness from a YAML file, resolving `source` against its directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::IoError(path.to_path_buf(), e))?;
        let mut config: HarnessConfig = serde_yaml::from_str(&content)
            .map_err(|e| HarnessError::ParseError(path.to_path_buf(), e.to_string()))?;

        if config.source.is_relative() {
            if let Some(dir) = path.parent() {
                config.source = dir.join(&config.source);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        let mut options = MachineOptions::default().with_debug(self.debug);
        options.apply_env_overrides();
        self.debug = options.debug;
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.source.as_os_str().is_empty() {
            return Err(HarnessError::ValidationError("source must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn read_source(&self) -> Result<String, HarnessError> {
        std::fs::read_to_string(&self.source)
            .map_err(|e| HarnessError::IoError(self.source.clone(), e))
    }

    /// Compiles the source against the slot actions and starts a machine.
    pub fn build(&self) -> Result<Machine<Value>, HarnessError> {
        let source = self.read_source()?;
        let callbacks = self.slots.iter().cloned().map(Action::into_callback).collect();
        let options = MachineOptions::default().with_debug(self.debug);
        let machine = Machine::from_source(options, self.store.clone(), &source, callbacks)?;
        tracing::debug!(
            source = %self.source.display(),
            slots = self.slots.len(),
            state = %machine.state(),
            "harness machine started"
        );
        Ok(machine)
    }
}

/// Harness error.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read '{}': {}", .0.display(), .1)]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse harness file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("harness validation failed: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parses a `--send` argument of the form `EVENT` or `EVENT=JSON`.
pub fn parse_send_arg(arg: &str) -> Result<(String, Value), serde_json::Error> {
    match arg.split_once('=') {
        Some((event, payload)) => Ok((event.to_string(), serde_json::from_str(payload)?)),
        None => Ok((arg.to_string(), Value::Null)),
    }
}

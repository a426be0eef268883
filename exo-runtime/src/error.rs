//! Runtime error types.

use crate::callback::HandlerError;
use exo_compiler::CompileError;
use thiserror::Error;

/// Errors from constructing or driving a machine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no main machine defined")]
    NoMainMachine,

    #[error("machine \"{machine}\" has no initial state")]
    NoInitialState { machine: String },

    #[error("unable to resolve state \"{target}\"")]
    UnresolvedTarget { target: String },

    #[error("alias chain from \"{target}\" never reaches a concrete state")]
    AliasCycle { target: String },

    #[error("machine has been dropped")]
    Dropped,

    #[error("machines must be constructed inside a tokio runtime")]
    NoAsyncRuntime,

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("handler {handler} failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: HandlerError,
    },
}

impl RuntimeError {
    /// Converts an error returned by a handler, keeping runtime errors intact.
    pub(crate) fn from_handler(handler: &str, err: HandlerError) -> Self {
        match err.downcast::<RuntimeError>() {
            Ok(runtime) => *runtime,
            Err(source) => RuntimeError::Handler {
                handler: handler.to_string(),
                source,
            },
        }
    }

    /// Returns whether this error is a configuration problem detected at construction.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RuntimeError::NoMainMachine
                | RuntimeError::NoInitialState { .. }
                | RuntimeError::NoAsyncRuntime
                | RuntimeError::Compile(_)
        )
    }

    /// Returns an error code suitable for tooling output.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuntimeError::NoMainMachine => "NO_MAIN_MACHINE",
            RuntimeError::NoInitialState { .. } => "NO_INITIAL_STATE",
            RuntimeError::UnresolvedTarget { .. } => "UNRESOLVED_TARGET",
            RuntimeError::AliasCycle { .. } => "ALIAS_CYCLE",
            RuntimeError::Dropped => "DROPPED",
            RuntimeError::NoAsyncRuntime => "NO_ASYNC_RUNTIME",
            RuntimeError::Compile(e) => e.error_code(),
            RuntimeError::Handler { .. } => "HANDLER_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_handler_unwraps_runtime_errors() {
        let boxed: HandlerError = Box::new(RuntimeError::UnresolvedTarget {
            target: "nowhere".to_string(),
        });
        let err = RuntimeError::from_handler("m.idle on:GO", boxed);
        assert!(matches!(err, RuntimeError::UnresolvedTarget { ref target } if target == "nowhere"));
    }

    #[test]
    fn test_from_handler_wraps_foreign_errors() {
        let boxed: HandlerError = "boom".into();
        let err = RuntimeError::from_handler("m.idle on:GO", boxed);
        assert_eq!(err.error_code(), "HANDLER_ERROR");
        assert_eq!(err.to_string(), "handler m.idle on:GO failed: boom");
    }

    #[test]
    fn test_compile_errors_keep_their_code() {
        let err = RuntimeError::from(CompileError::DuplicateMachine {
            machine: "m".to_string(),
        });
        assert_eq!(err.error_code(), "INVALID_DEFINITION");
        assert!(err.is_configuration());
    }
}

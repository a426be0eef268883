//! Machine construction options.

use crate::trace::{LogTracer, Tracer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Options passed to `Machine::new`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineOptions {
    /// Emit trace events for every transition.
    pub debug: bool,
    /// Trace sink; `LogTracer` when unset.
    #[serde(skip)]
    pub tracer: Option<Arc<dyn Tracer>>,
}

impl MachineOptions {
    /// Options with debug tracing toggled by `EXO_DEBUG`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env_overrides();
        options
    }

    /// Applies `EXO_DEBUG` (`1`, `true`, `yes`, `on` enable; anything else disables).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("EXO_DEBUG") {
            self.debug = parse_flag(&value);
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub(crate) fn tracer(&self) -> Arc<dyn Tracer> {
        match &self.tracer {
            Some(tracer) => Arc::clone(tracer),
            None => Arc::new(LogTracer),
        }
    }
}

impl fmt::Debug for MachineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineOptions")
            .field("debug", &self.debug)
            .field("tracer", &self.tracer.as_ref().map(|_| ".."))
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MachineOptions::default();
        assert!(!options.debug);
        assert!(options.tracer.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let options: MachineOptions = serde_json::from_str(r#"{"debug": true}"#).unwrap();
        assert!(options.debug);
        let options: MachineOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.debug);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}

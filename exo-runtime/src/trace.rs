//! Debug tracing of machine activity.

use exo_compiler::format_duration;
use std::fmt;
use std::time::Duration;

/// Something the engine did, reported when debug tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent<'a> {
    /// The current machine changed.
    MachineSwitch { from: Option<&'a str>, to: &'a str },
    /// A state was entered. `initial` marks the machine's initial state.
    Enter {
        machine: &'a str,
        state: &'a str,
        initial: bool,
    },
    Exit { machine: &'a str, state: &'a str },
    /// A wait timer elapsed and its handler is starting.
    WaitElapsed {
        machine: &'a str,
        state: &'a str,
        delay: Duration,
    },
    /// A final state was entered and the machine is done.
    Done { machine: &'a str },
}

impl fmt::Display for TraceEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::MachineSwitch { from: Some(from), to } => write!(f, "machine {} -> {}", from, to),
            TraceEvent::MachineSwitch { from: None, to } => write!(f, "machine -> {}", to),
            TraceEvent::Enter {
                machine,
                state,
                initial,
            } => {
                write!(f, "enter {}.{}", machine, state)?;
                if *initial {
                    f.write_str(" (initial)")?;
                }
                Ok(())
            }
            TraceEvent::Exit { machine, state } => write!(f, "exit {}.{}", machine, state),
            TraceEvent::WaitElapsed {
                machine,
                state,
                delay,
            } => write!(f, "wait {} elapsed in {}.{}", format_duration(*delay), machine, state),
            TraceEvent::Done { machine } => write!(f, "done {}", machine),
        }
    }
}

/// Receives trace events.
pub trait Tracer: Send + Sync {
    fn trace(&self, event: &TraceEvent<'_>);
}

/// Forwards trace events to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn trace(&self, event: &TraceEvent<'_>) {
        tracing::debug!(target: "exo::trace", "{}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let enter = TraceEvent::Enter {
            machine: "m",
            state: "idle",
            initial: true,
        };
        assert_eq!(enter.to_string(), "enter m.idle (initial)");
        let wait = TraceEvent::WaitElapsed {
            machine: "m",
            state: "idle",
            delay: Duration::from_millis(100),
        };
        assert_eq!(wait.to_string(), "wait 100ms elapsed in m.idle");
        let switch = TraceEvent::MachineSwitch {
            from: Some("a"),
            to: "b",
        };
        assert_eq!(switch.to_string(), "machine a -> b");
    }
}

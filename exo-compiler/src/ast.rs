//! Compiled statechart forest.
//!
//! The forest is index addressed: machines live in one vector, states in a
//! vector per machine, and every cross reference (aliases, the main machine,
//! a state's owning machine) is stored as an index resolved at compile time.

use crate::duration::format_duration;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Address of a state: machine index plus state index within that machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateRef {
    pub machine: usize,
    pub state: usize,
}

impl StateRef {
    pub fn new(machine: usize, state: usize) -> Self {
        Self { machine, state }
    }
}

/// Lifecycle points a `@` handler can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Enter,
    Exit,
    Done,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Enter => "enter",
            Lifecycle::Exit => "exit",
            Lifecycle::Done => "done",
        }
    }
}

impl FromStr for Lifecycle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter" => Ok(Lifecycle::Enter),
            "exit" => Ok(Lifecycle::Exit),
            "done" => Ok(Lifecycle::Done),
            _ => Err(()),
        }
    }
}

/// What a handler reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// `@enter`, `@exit` or `@done`.
    At(Lifecycle),
    /// `on:EVENT`, or `on:*` for every event.
    On(String),
    /// `wait:DURATION`.
    Wait(Duration),
}

impl Trigger {
    /// The handler kind as written in source: `at`, `on` or `wait`.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::At(_) => "at",
            Trigger::On(_) => "on",
            Trigger::Wait(_) => "wait",
        }
    }

    /// Returns true if this trigger handles `event`, directly or as a wildcard.
    pub fn handles_event(&self, event: &str) -> bool {
        matches!(self, Trigger::On(name) if name == event || name == "*")
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::At(hook) => write!(f, "@{}", hook.as_str()),
            Trigger::On(event) => write!(f, "on:{}", event),
            Trigger::Wait(duration) => write!(f, "wait:{}", format_duration(*duration)),
        }
    }
}

/// A handler bound to a callback from the substitution table.
#[derive(Debug, Clone)]
pub struct HandlerNode<F> {
    pub trigger: Trigger,
    pub callback: F,
    pub comment: Option<String>,
}

/// A state within a machine.
#[derive(Debug, Clone)]
pub struct StateNode<F> {
    pub name: String,
    pub initial: bool,
    pub is_final: bool,
    /// For alias states, the machine whose initial state is entered instead.
    pub immediate: Option<usize>,
    pub handlers: Vec<HandlerNode<F>>,
    pub comment: Option<String>,
}

impl<F> StateNode<F> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            initial: false,
            is_final: false,
            immediate: None,
            handlers: Vec::new(),
            comment: None,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.immediate.is_some()
    }

    /// First handler bound to the given lifecycle point.
    pub fn lifecycle(&self, hook: Lifecycle) -> Option<&HandlerNode<F>> {
        self.handlers
            .iter()
            .find(|h| h.trigger == Trigger::At(hook))
    }

    /// Handlers for `event` plus wildcard handlers, in declaration order.
    pub fn event_handlers<'a>(
        &'a self,
        event: &'a str,
    ) -> impl Iterator<Item = &'a HandlerNode<F>> + 'a {
        self.handlers
            .iter()
            .filter(move |h| h.trigger.handles_event(event))
    }

    /// All `wait` handlers with their delays.
    pub fn wait_handlers(&self) -> impl Iterator<Item = (Duration, &HandlerNode<F>)> {
        self.handlers.iter().filter_map(|h| match h.trigger {
            Trigger::Wait(d) => Some((d, h)),
            _ => None,
        })
    }
}

/// A named machine.
#[derive(Debug, Clone)]
pub struct MachineNode<F> {
    pub name: String,
    pub main: bool,
    /// Parsed from `is NAME`; not interpreted by the runtime.
    pub inherits: Option<String>,
    pub states: Vec<StateNode<F>>,
    /// Machine-scoped handlers; only `@done` is dispatched.
    pub handlers: Vec<HandlerNode<F>>,
    pub comment: Option<String>,
}

impl<F> MachineNode<F> {
    pub(crate) fn new() -> Self {
        Self {
            name: String::new(),
            main: false,
            inherits: None,
            states: Vec::new(),
            handlers: Vec::new(),
            comment: None,
        }
    }

    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    pub fn state(&self, name: &str) -> Option<&StateNode<F>> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Index of the first state marked `initial`.
    pub fn initial_index(&self) -> Option<usize> {
        self.states.iter().position(|s| s.initial)
    }

    pub fn initial_state(&self) -> Option<&StateNode<F>> {
        self.initial_index().map(|i| &self.states[i])
    }

    /// First machine-level handler bound to the given lifecycle point.
    pub fn lifecycle(&self, hook: Lifecycle) -> Option<&HandlerNode<F>> {
        self.handlers
            .iter()
            .find(|h| h.trigger == Trigger::At(hook))
    }
}

/// All machines compiled from one source text.
#[derive(Debug, Clone)]
pub struct Forest<F> {
    pub machines: Vec<MachineNode<F>>,
    /// Index of the main machine.
    pub main: Option<usize>,
}

impl<F> Default for Forest<F> {
    fn default() -> Self {
        Self {
            machines: Vec::new(),
            main: None,
        }
    }
}

impl<F> Forest<F> {
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn machine_index(&self, name: &str) -> Option<usize> {
        self.machines.iter().position(|m| m.name == name)
    }

    pub fn machine(&self, name: &str) -> Option<&MachineNode<F>> {
        self.machine_index(name).map(|i| &self.machines[i])
    }

    pub fn main_machine(&self) -> Option<&MachineNode<F>> {
        self.main.and_then(|i| self.machines.get(i))
    }

    /// Looks up a state by reference.
    pub fn state(&self, at: StateRef) -> Option<&StateNode<F>> {
        self.machines.get(at.machine)?.states.get(at.state)
    }

    /// Looks up a state by machine and state name.
    pub fn find(&self, machine: &str, state: &str) -> Option<StateRef> {
        let m = self.machine_index(machine)?;
        let s = self.machines[m].state_index(state)?;
        Some(StateRef::new(m, s))
    }

    /// Renders a reference as `machine.state`.
    pub fn path(&self, at: StateRef) -> String {
        match (self.machines.get(at.machine), self.state(at)) {
            (Some(m), Some(s)) => format!("{}.{}", m.name, s.name),
            _ => format!("#{}.#{}", at.machine, at.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(trigger: Trigger, id: u8) -> HandlerNode<u8> {
        HandlerNode {
            trigger,
            callback: id,
            comment: None,
        }
    }

    fn sample() -> Forest<u8> {
        let mut idle = StateNode::new("idle".to_string());
        idle.initial = true;
        idle.handlers = vec![
            handler(Trigger::On("GO".to_string()), 1),
            handler(Trigger::At(Lifecycle::Exit), 2),
            handler(Trigger::On("*".to_string()), 3),
            handler(Trigger::Wait(Duration::from_millis(100)), 4),
            handler(Trigger::On("STOP".to_string()), 5),
        ];
        let running = StateNode::new("running".to_string());

        let mut machine = MachineNode::new();
        machine.name = "m".to_string();
        machine.main = true;
        machine.states = vec![running, idle];

        Forest {
            machines: vec![machine],
            main: Some(0),
        }
    }

    #[test]
    fn test_event_handlers_include_wildcard() {
        let forest = sample();
        let idle = forest.machines[0].state("idle").unwrap();
        let ids: Vec<u8> = idle.event_handlers("GO").map(|h| h.callback).collect();
        assert_eq!(ids, vec![1, 3]);
        let ids: Vec<u8> = idle.event_handlers("OTHER").map(|h| h.callback).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_lifecycle_and_wait_lookup() {
        let forest = sample();
        let idle = forest.machines[0].state("idle").unwrap();
        assert_eq!(idle.lifecycle(Lifecycle::Exit).map(|h| h.callback), Some(2));
        assert!(idle.lifecycle(Lifecycle::Enter).is_none());
        let waits: Vec<_> = idle.wait_handlers().map(|(d, h)| (d, h.callback)).collect();
        assert_eq!(waits, vec![(Duration::from_millis(100), 4)]);
    }

    #[test]
    fn test_initial_and_paths() {
        let forest = sample();
        let machine = forest.main_machine().unwrap();
        assert_eq!(machine.initial_index(), Some(1));
        let at = forest.find("m", "idle").unwrap();
        assert_eq!(at, StateRef::new(0, 1));
        assert_eq!(forest.path(at), "m.idle");
        assert!(forest.find("m", "missing").is_none());
        assert!(forest.find("other", "idle").is_none());
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::At(Lifecycle::Done).to_string(), "@done");
        assert_eq!(Trigger::On("GO".to_string()).to_string(), "on:GO");
        assert_eq!(
            Trigger::Wait(Duration::from_millis(1500)).to_string(),
            "wait:1500ms"
        );
        assert_eq!(Trigger::Wait(Duration::from_secs(3)).to_string(), "wait:3s");
    }
}

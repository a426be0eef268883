//! Single-pass structural parser.
//!
//! The parser walks the significant tokens once, tracking the current and
//! previous mode (root, machine, state, handler). States are appended to
//! their machine as soon as they are named; handlers are appended when their
//! callback slot is seen. A post-pass resolves `*machine` alias states into
//! machine indices.

use crate::ast::{Forest, HandlerNode, Lifecycle, MachineNode, StateNode, Trigger};
use crate::duration::parse_duration;
use crate::error::CompileError;
use crate::lexer::{Token, TokenKind, TokenValue};
use crate::preprocess::Substitution;
use std::collections::HashMap;

/// Marks a state name as a reference to another machine.
pub const ALIAS_MARKER: char = '*';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Root,
    Machine,
    State,
    Handler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    At,
    On,
    Wait,
}

impl HandlerKind {
    fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::At => "@",
            HandlerKind::On => "on",
            HandlerKind::Wait => "wait",
        }
    }
}

/// Handler between its keyword and its slot.
struct OpenHandler {
    kind: HandlerKind,
    trigger: Option<Trigger>,
    /// Adjacent tokens of a `wait` duration, parsed when the slot is seen.
    literal: String,
    literal_end: Option<usize>,
    comment: Option<String>,
}

impl OpenHandler {
    fn new(kind: HandlerKind, comment: Option<String>) -> Self {
        Self {
            kind,
            trigger: None,
            literal: String::new(),
            literal_end: None,
            comment,
        }
    }

    fn label(&self) -> String {
        match &self.trigger {
            Some(trigger) => trigger.to_string(),
            None if !self.literal.is_empty() => format!("wait:{}", self.literal),
            None => self.kind.as_str().to_string(),
        }
    }

    /// Appends `token` to the duration literal if it continues it.
    ///
    /// The lexer splits `-5ms` and `1e-3s` into words and sign symbols; they
    /// are rejoined here so the sign reaches `parse_duration`.
    fn extend_literal(&mut self, token: &Token) -> bool {
        if self.kind != HandlerKind::Wait || self.trigger.is_some() {
            return false;
        }
        let piece = match (&token.kind, &token.value) {
            (TokenKind::Word, TokenValue::Text(text)) => text,
            (TokenKind::Symbol, TokenValue::Text(text)) if text == "+" || text == "-" => text,
            _ => return false,
        };
        if self.literal_end.is_some_and(|end| end != token.start) {
            return false;
        }
        self.literal.push_str(piece);
        self.literal_end = Some(token.end);
        true
    }
}

struct Parser<'a, F> {
    slots: &'a [Substitution<F>],
    machines: Vec<MachineNode<F>>,
    machine: Option<MachineNode<F>>,
    /// Unnamed state awaiting its name token.
    unnamed_state: Option<StateNode<F>>,
    /// Index of the named state currently open in `machine`.
    state: Option<usize>,
    handler: Option<OpenHandler>,
    mode: Mode,
    prev_mode: Mode,
    comment: Option<String>,
}

impl<'a, F: Clone> Parser<'a, F> {
    fn new(slots: &'a [Substitution<F>]) -> Self {
        Self {
            slots,
            machines: Vec::new(),
            machine: None,
            unnamed_state: None,
            state: None,
            handler: None,
            mode: Mode::Root,
            prev_mode: Mode::Root,
            comment: None,
        }
    }

    fn run(mut self, tokens: &[Token]) -> Result<Forest<F>, CompileError> {
        let tokens = significant(tokens);
        let mut prev: Option<&Token> = None;

        for token in &tokens {
            if token.kind == TokenKind::Comment {
                self.comment = token.text().map(normalize_comment);
                continue;
            }
            self.accept(token, prev)?;
            prev = Some(token);
        }

        self.finish()
    }

    fn accept(&mut self, token: &Token, prev: Option<&Token>) -> Result<(), CompileError> {
        let prev_is = |s: &str| prev.map(|p| p.is(s)).unwrap_or(false);

        if token.kind == TokenKind::Keyword {
            match token.text() {
                Some("machine") => {
                    self.ensure_no_open_handler()?;
                    self.finish_machine()?;
                    self.prev_mode = self.mode;
                    self.mode = Mode::Machine;
                    let mut machine = MachineNode::new();
                    machine.main = prev_is("main");
                    machine.comment = self.comment.take();
                    self.machine = Some(machine);
                    return Ok(());
                }
                Some("state") => {
                    self.ensure_no_open_handler()?;
                    self.ensure_named_state()?;
                    self.prev_mode = self.mode;
                    self.mode = Mode::State;
                    let mut state = StateNode::new(String::new());
                    state.initial = prev_is("initial");
                    state.is_final = prev_is("final");
                    state.comment = self.comment.take();
                    self.unnamed_state = Some(state);
                    self.state = None;
                    return Ok(());
                }
                Some(keyword @ ("@" | "on" | "wait")) => {
                    self.ensure_no_open_handler()?;
                    let kind = match keyword {
                        "@" => HandlerKind::At,
                        "on" => HandlerKind::On,
                        _ => HandlerKind::Wait,
                    };
                    self.prev_mode = self.mode;
                    self.mode = Mode::Handler;
                    self.handler = Some(OpenHandler::new(kind, self.comment.take()));
                    return Ok(());
                }
                // `initial`, `final` and `is` only modify what follows.
                _ => return Ok(()),
            }
        }

        // A comment survives the `main` prefix on its way to `machine`.
        if !token.is("main") {
            self.comment = None;
        }

        match self.mode {
            Mode::Root => Ok(()),
            Mode::Machine => self.accept_in_machine(token, prev_is("is")),
            Mode::State => self.accept_in_state(token),
            Mode::Handler => self.accept_in_handler(token),
        }
    }

    fn accept_in_machine(&mut self, token: &Token, after_is: bool) -> Result<(), CompileError> {
        if token.is("}") {
            self.finish_machine()?;
            self.prev_mode = self.mode;
            self.mode = Mode::Root;
            return Ok(());
        }
        if token.kind != TokenKind::Word {
            return Ok(());
        }
        if let (Some(machine), Some(word)) = (self.machine.as_mut(), token.text()) {
            if after_is {
                machine.inherits = Some(word.to_string());
            } else if machine.name.is_empty() {
                machine.name = word.to_string();
            }
        }
        Ok(())
    }

    fn accept_in_state(&mut self, token: &Token) -> Result<(), CompileError> {
        if token.is("}") || token.is(";") {
            self.ensure_named_state()?;
            self.prev_mode = self.mode;
            self.mode = Mode::Machine;
            self.state = None;
            return Ok(());
        }
        if token.kind != TokenKind::Word {
            return Ok(());
        }
        if let (Some(mut state), Some(word)) = (self.unnamed_state.take(), token.text()) {
            state.name = word.to_string();
            let Some(machine) = self.machine.as_mut() else {
                return Err(CompileError::Misplaced {
                    what: format!("state \"{}\"", state.name),
                    parent: "machine",
                });
            };
            machine.states.push(state);
            self.state = Some(machine.states.len() - 1);
        }
        Ok(())
    }

    fn accept_in_handler(&mut self, token: &Token) -> Result<(), CompileError> {
        let Some(handler) = self.handler.as_mut() else {
            self.mode = self.prev_mode;
            return Ok(());
        };

        if handler.extend_literal(token) {
            return Ok(());
        }

        match (&token.kind, &token.value) {
            (TokenKind::Symbol, TokenValue::Text(s)) if s == "}" => {
                Err(CompileError::MissingCallback {
                    handler: handler.label(),
                })
            }
            (TokenKind::Word, TokenValue::Text(word))
                if handler.trigger.is_none() && handler.kind != HandlerKind::Wait =>
            {
                handler.trigger = Some(match handler.kind {
                    HandlerKind::At => Trigger::At(word.parse::<Lifecycle>().map_err(|_| {
                        CompileError::UnknownLifecycle { hook: word.clone() }
                    })?),
                    _ => Trigger::On(word.clone()),
                });
                Ok(())
            }
            (TokenKind::Slot, TokenValue::Slot(index)) => {
                if handler.trigger.is_none() && !handler.literal.is_empty() {
                    handler.trigger = Some(Trigger::Wait(parse_duration(&handler.literal)?));
                }
                let index = *index;
                self.close_handler(index)
            }
            _ => Ok(()),
        }
    }

    fn close_handler(&mut self, slot: usize) -> Result<(), CompileError> {
        let Some(open) = self.handler.take() else {
            return Ok(());
        };
        let Some(trigger) = open.trigger.clone() else {
            return Err(CompileError::MissingHandle {
                handler: open.label(),
            });
        };
        let callback = self
            .slots
            .get(slot)
            .and_then(Substitution::as_callback)
            .cloned()
            .ok_or_else(|| CompileError::NotCallable {
                handler: open.label(),
            })?;

        let node = HandlerNode {
            trigger,
            callback,
            comment: open.comment,
        };

        let misplaced = |label: String, parent| CompileError::Misplaced {
            what: format!("handler \"{}\"", label),
            parent,
        };
        let Some(machine) = self.machine.as_mut() else {
            return Err(misplaced(open_label(&node), "machine"));
        };
        match self.prev_mode {
            Mode::Machine => machine.handlers.push(node),
            _ => match self.state {
                Some(index) => machine.states[index].handlers.push(node),
                None => return Err(misplaced(open_label(&node), "state")),
            },
        }

        self.mode = self.prev_mode;
        Ok(())
    }

    fn ensure_no_open_handler(&self) -> Result<(), CompileError> {
        match &self.handler {
            Some(open) => Err(CompileError::MissingCallback {
                handler: open.label(),
            }),
            None => Ok(()),
        }
    }

    fn ensure_named_state(&self) -> Result<(), CompileError> {
        match &self.unnamed_state {
            Some(_) => Err(CompileError::MissingName {
                what: "state".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn finish_machine(&mut self) -> Result<(), CompileError> {
        self.ensure_named_state()?;
        if let Some(machine) = self.machine.take() {
            if machine.name.is_empty() {
                return Err(CompileError::MissingName {
                    what: "machine".to_string(),
                });
            }
            let mut initial = machine.states.iter().filter(|s| s.initial);
            if let (Some(first), Some(second)) = (initial.next(), initial.next()) {
                return Err(CompileError::DuplicateInitial {
                    machine: machine.name.clone(),
                    first: first.name.clone(),
                    second: second.name.clone(),
                });
            }
            self.machines.push(machine);
        }
        self.state = None;
        Ok(())
    }

    fn finish(mut self) -> Result<Forest<F>, CompileError> {
        self.ensure_no_open_handler()?;
        self.finish_machine()?;

        let mut forest = Forest {
            machines: self.machines,
            main: None,
        };

        if forest.machines.len() == 1 {
            forest.machines[0].main = true;
        }
        for (index, machine) in forest.machines.iter().enumerate() {
            if !machine.main {
                continue;
            }
            if let Some(first) = forest.main {
                return Err(CompileError::DuplicateMain {
                    first: forest.machines[first].name.clone(),
                    second: machine.name.clone(),
                });
            }
            forest.main = Some(index);
        }

        resolve_aliases(&mut forest)?;

        tracing::debug!(
            machines = forest.machines.len(),
            main = ?forest.main_machine().map(|m| m.name.as_str()),
            "parsed statechart forest"
        );
        Ok(forest)
    }
}

fn open_label<F>(node: &HandlerNode<F>) -> String {
    node.trigger.to_string()
}

/// Drops whitespace and splits multi-character symbols into single characters.
fn significant(tokens: &[Token]) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match (&token.kind, &token.value) {
            (TokenKind::Whitespace, _) => {}
            (TokenKind::Symbol, TokenValue::Text(text)) if text.chars().count() > 1 => {
                for (offset, ch) in text.char_indices() {
                    out.push(Token {
                        start: token.start + offset,
                        end: token.start + offset + ch.len_utf8(),
                        value: TokenValue::Text(ch.to_string()),
                        kind: TokenKind::Symbol,
                    });
                }
            }
            _ => out.push(token.clone()),
        }
    }
    out
}

/// Strips comment delimiters and surrounding whitespace.
pub fn normalize_comment(comment: &str) -> String {
    let trimmed = comment.trim();
    let body = trimmed
        .strip_prefix("//")
        .or_else(|| trimmed.strip_prefix("/*"))
        .unwrap_or(trimmed);
    let body = body.strip_suffix("*/").unwrap_or(body);
    body.trim().to_string()
}

/// Rewrites `*name` states into aliases of machine `name`.
fn resolve_aliases<F>(forest: &mut Forest<F>) -> Result<(), CompileError> {
    let mut names: HashMap<String, usize> = HashMap::with_capacity(forest.machines.len());
    for (index, machine) in forest.machines.iter().enumerate() {
        if names.insert(machine.name.clone(), index).is_some() {
            return Err(CompileError::DuplicateMachine {
                machine: machine.name.clone(),
            });
        }
    }

    for machine in forest.machines.iter_mut() {
        for state in machine.states.iter_mut() {
            let Some(target) = state.name.strip_prefix(ALIAS_MARKER) else {
                continue;
            };
            let index = *names
                .get(target)
                .ok_or_else(|| CompileError::UnresolvedAlias {
                    machine: machine.name.clone(),
                    state: state.name.clone(),
                    target: target.to_string(),
                })?;
            state.name = target.to_string();
            state.immediate = Some(index);
        }
    }

    Ok(())
}

/// Parses lexed tokens into a forest, resolving slots against `slots`.
pub fn parse<F: Clone>(
    tokens: &[Token],
    slots: &[Substitution<F>],
) -> Result<Forest<F>, CompileError> {
    Parser::new(slots).run(tokens)
}

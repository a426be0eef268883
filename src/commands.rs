//! One-shot commands: token dumps and forest outlines.

use colored::Colorize;
use exo_compiler::{compile_str, lex, CompileError, Forest, HandlerNode, MachineNode, Token, TokenValue};
use serde::Serialize;
use std::fmt::Write;

/// Lexes `source` and renders one token per line.
pub fn tokens(source: &str) -> Result<String, CompileError> {
    let tokens = lex(source)?;
    let mut out = String::new();
    for token in &tokens {
        let _ = writeln!(out, "{}", format_token(token));
    }
    Ok(out)
}

fn format_token(token: &Token) -> String {
    let value = match &token.value {
        TokenValue::Text(text) => format!("{:?}", text),
        TokenValue::Slot(index) => format!("${{{}}}", index),
    };
    format!(
        "{:>5}..{:<5} {:<10} {}",
        token.start,
        token.end,
        token.kind.to_string().dimmed(),
        value
    )
}

/// Compiles `source` with every slot bound to a placeholder.
pub fn compile_outline(source: &str) -> Result<Forest<()>, CompileError> {
    compile_str(source, vec![(); slot_count(source)?])
}

/// One past the highest slot index in `source`.
fn slot_count(source: &str) -> Result<usize, CompileError> {
    Ok(lex(source)?
        .iter()
        .filter_map(Token::slot)
        .filter(|&index| index != usize::MAX)
        .map(|index| index + 1)
        .max()
        .unwrap_or(0))
}

/// Renders a forest as a colored tree.
pub fn format_forest<F>(forest: &Forest<F>) -> String {
    let mut out = String::new();
    for machine in &forest.machines {
        format_machine(&mut out, machine);
    }
    out
}

fn format_machine<F>(out: &mut String, machine: &MachineNode<F>) {
    if let Some(comment) = &machine.comment {
        let _ = writeln!(out, "{}", format!("// {}", comment).dimmed());
    }
    let mut header = format!("{} {}", "machine".blue(), machine.name.cyan().bold());
    if machine.main {
        header = format!("{} {}", "main".blue(), header);
    }
    if let Some(parent) = &machine.inherits {
        header = format!("{} is {}", header, parent.cyan());
    }
    let _ = writeln!(out, "{}", header);

    for state in &machine.states {
        let mut flags = Vec::new();
        if state.initial {
            flags.push("initial");
        }
        if state.is_final {
            flags.push("final");
        }
        let name = if state.is_alias() {
            format!("*{}", state.name).magenta().to_string()
        } else {
            state.name.yellow().to_string()
        };
        let mut line = format!("  state {}", name);
        if !flags.is_empty() {
            line = format!("{} [{}]", line, flags.join(", ").green());
        }
        if let Some(comment) = &state.comment {
            line = format!("{}  {}", line, format!("// {}", comment).dimmed());
        }
        let _ = writeln!(out, "{}", line);
        for handler in &state.handlers {
            format_handler(out, "    ", handler);
        }
    }
    for handler in &machine.handlers {
        format_handler(out, "  ", handler);
    }
}

fn format_handler<F>(out: &mut String, indent: &str, handler: &HandlerNode<F>) {
    let mut line = format!("{}{}", indent, handler.trigger.to_string().white());
    if let Some(comment) = &handler.comment {
        line = format!("{}  {}", line, format!("// {}", comment).dimmed());
    }
    let _ = writeln!(out, "{}", line);
}

#[derive(Debug, Serialize)]
pub struct MachineOutline {
    pub name: String,
    pub main: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub states: Vec<StateOutline>,
    pub handlers: Vec<HandlerOutline>,
}

#[derive(Debug, Serialize)]
pub struct StateOutline {
    pub name: String,
    pub initial: bool,
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub handlers: Vec<HandlerOutline>,
}

#[derive(Debug, Serialize)]
pub struct HandlerOutline {
    pub kind: &'static str,
    pub trigger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Builds a serializable outline of a forest.
pub fn outline<F>(forest: &Forest<F>) -> Vec<MachineOutline> {
    let handlers = |list: &[HandlerNode<F>]| -> Vec<HandlerOutline> {
        list.iter()
            .map(|h| HandlerOutline {
                kind: h.trigger.kind(),
                trigger: h.trigger.to_string(),
                comment: h.comment.clone(),
            })
            .collect()
    };

    forest
        .machines
        .iter()
        .map(|machine| MachineOutline {
            name: machine.name.clone(),
            main: machine.main,
            inherits: machine.inherits.clone(),
            comment: machine.comment.clone(),
            states: machine
                .states
                .iter()
                .map(|state| StateOutline {
                    name: state.name.clone(),
                    initial: state.initial,
                    is_final: state.is_final,
                    alias_of: state
                        .immediate
                        .and_then(|i| forest.machines.get(i))
                        .map(|m| m.name.clone()),
                    comment: state.comment.clone(),
                    handlers: handlers(&state.handlers),
                })
                .collect(),
            handlers: handlers(&machine.handlers),
        })
        .collect()
}

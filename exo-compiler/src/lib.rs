//! # exo-compiler
//!
//! Statechart DSL compiler for exo.
//!
//! This crate provides:
//! - Template preprocessing (text fragments plus callback slots)
//! - A modal lexer for the statechart notation
//! - A single-pass parser producing an index-addressed machine forest
//! - Duration literals for `wait` handlers
//!
//! The compiler is generic over the callback type, so the runtime can bind
//! its own handler representation while tooling binds placeholders.

pub mod ast;
pub mod duration;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod preprocess;

pub use ast::{Forest, HandlerNode, Lifecycle, MachineNode, StateNode, StateRef, Trigger};
pub use duration::{format_duration, parse_duration};
pub use error::{CompileError, Location};
pub use lexer::{lex, Token, TokenKind, TokenValue};
pub use parser::parse;
pub use preprocess::{preprocess, Substitution, Template, TemplateBuilder};

/// Compiles a preprocessed template into a forest.
pub fn compile<F: Clone>(template: &Template<F>) -> Result<Forest<F>, CompileError> {
    let tokens = lex(&template.source)?;
    parse(&tokens, &template.slots)
}

/// Compiles source text carrying explicit `${N}` slots against `callbacks`.
pub fn compile_str<F: Clone>(source: &str, callbacks: Vec<F>) -> Result<Forest<F>, CompileError> {
    compile(&Template::from_source(source, callbacks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_builder_template() {
        let template = Template::builder()
            .text("main machine ")
            .value("light")
            .text(" { initial state red { wait:")
            .number(2.0)
            .text("s ")
            .callback("to-green")
            .text(" } state green {} }")
            .build();

        let forest = compile(&template).unwrap();
        let light = forest.main_machine().unwrap();
        assert_eq!(light.name, "light");
        let (delay, handler) = light.states[0].wait_handlers().next().unwrap();
        assert_eq!(delay, std::time::Duration::from_secs(2));
        assert_eq!(handler.callback, "to-green");
    }

    #[test]
    fn test_compile_str() {
        let forest = compile_str(
            "main machine m { initial state idle { on:GO ${0} } state running {} }",
            vec![1u32],
        )
        .unwrap();
        assert_eq!(forest.find("m", "running"), Some(StateRef::new(0, 1)));
    }

    #[test]
    fn test_lex_error_surfaces_through_compile() {
        let err = compile_str::<u32>("machine m {\u{0} }", vec![]).unwrap_err();
        assert_eq!(err.error_code(), "LEX_ERROR");
    }
}

//! Compiler error types.

use thiserror::Error;

/// 1-based position in the merged source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl Location {
    /// Computes the line/column of a byte offset into `source`.
    pub fn of(source: &str, offset: usize) -> Self {
        let mut line = 1;
        let mut col = 1;
        for (i, ch) in source.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Self { line, col }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Errors raised while compiling statechart source.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("unrecognized character {ch:?} at {at}")]
    UnrecognizedCharacter { ch: char, at: Location },

    #[error("unterminated block comment starting at {at}")]
    UnterminatedComment { at: Location },

    #[error("unterminated slot starting at {at}")]
    UnterminatedSlot { at: Location },

    #[error("empty slot at {at}")]
    EmptySlot { at: Location },

    #[error("invalid duration \"{literal}\": {reason}")]
    InvalidDuration { literal: String, reason: String },

    #[error("unexpected suffix \"{suffix}\" for duration \"{literal}\"")]
    UnsupportedUnit { literal: String, suffix: String },

    #[error("{handler} must be a function")]
    NotCallable { handler: String },

    #[error("{handler} is missing its callback slot")]
    MissingCallback { handler: String },

    #[error("handler \"{handler}\" has no event, hook or duration")]
    MissingHandle { handler: String },

    #[error("unknown lifecycle hook \"@{hook}\" (expected enter, exit or done)")]
    UnknownLifecycle { hook: String },

    #[error("{what} must be declared inside a {parent}")]
    Misplaced { what: String, parent: &'static str },

    #[error("{what} is missing a name")]
    MissingName { what: String },

    #[error("machine \"{machine}\" is declared more than once")]
    DuplicateMachine { machine: String },

    #[error("machine \"{machine}\" marks both \"{first}\" and \"{second}\" as initial")]
    DuplicateInitial {
        machine: String,
        first: String,
        second: String,
    },

    #[error("both \"{first}\" and \"{second}\" are marked as main")]
    DuplicateMain { first: String, second: String },

    #[error("unable to find machine \"{target}\" referenced by state \"{machine}.{state}\"")]
    UnresolvedAlias {
        machine: String,
        state: String,
        target: String,
    },
}

impl CompileError {
    /// Returns an error code suitable for tooling output.
    pub fn error_code(&self) -> &'static str {
        match self {
            CompileError::UnrecognizedCharacter { .. }
            | CompileError::UnterminatedComment { .. }
            | CompileError::UnterminatedSlot { .. }
            | CompileError::EmptySlot { .. } => "LEX_ERROR",
            CompileError::InvalidDuration { .. } | CompileError::UnsupportedUnit { .. } => {
                "INVALID_DURATION"
            }
            CompileError::NotCallable { .. } | CompileError::MissingCallback { .. } => {
                "INVALID_SLOT"
            }
            CompileError::MissingHandle { .. }
            | CompileError::UnknownLifecycle { .. }
            | CompileError::Misplaced { .. }
            | CompileError::MissingName { .. } => "PARSE_ERROR",
            CompileError::DuplicateMachine { .. }
            | CompileError::DuplicateInitial { .. }
            | CompileError::DuplicateMain { .. } => "INVALID_DEFINITION",
            CompileError::UnresolvedAlias { .. } => "UNRESOLVED_ALIAS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_of_offset() {
        let src = "ab\ncd\nef";
        assert_eq!(Location::of(src, 0), Location { line: 1, col: 1 });
        assert_eq!(Location::of(src, 4), Location { line: 2, col: 2 });
        assert_eq!(Location::of(src, 6), Location { line: 3, col: 1 });
    }

    #[test]
    fn test_error_codes() {
        let err = CompileError::NotCallable {
            handler: "on:GO".to_string(),
        };
        assert_eq!(err.error_code(), "INVALID_SLOT");
        assert_eq!(err.to_string(), "on:GO must be a function");
    }
}

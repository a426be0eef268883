//! Modal tokenizer for statechart source.
//!
//! The scanner runs in one of four modes:
//!
//! - normal: characters are classified and runs of the same class merge
//! - block comment: entered on `/*`, left after `*/`
//! - line comment: entered on `//`, left at the next newline
//! - slot capture: entered on `${`, collects digits until `}`

use crate::error::{CompileError, Location};
use serde::Serialize;
use std::fmt;

/// Words that the parser treats as structure rather than names.
pub const KEYWORDS: &[&str] = &["machine", "state", "initial", "final", "@", "on", "wait", "is"];

/// Returns true if `word` is a reserved keyword.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Coarse token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Keyword,
    Word,
    Symbol,
    Slot,
    Whitespace,
    Comment,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Word => "word",
            TokenKind::Symbol => "symbol",
            TokenKind::Slot => "slot",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// Token payload: source text, or the table index of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TokenValue {
    Text(String),
    Slot(usize),
}

/// A lexed token. `start` and `end` are byte offsets into the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub value: TokenValue,
    pub kind: TokenKind,
}

impl Token {
    /// Returns the token text, or `None` for slots.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Text(s) => Some(s),
            TokenValue::Slot(_) => None,
        }
    }

    /// Returns the slot index, if this is a slot token.
    pub fn slot(&self) -> Option<usize> {
        match self.value {
            TokenValue::Slot(i) => Some(i),
            TokenValue::Text(_) => None,
        }
    }

    /// Returns true if the token text equals `s`.
    pub fn is(&self, s: &str) -> bool {
        self.text() == Some(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    BlockComment,
    LineComment,
    Slot,
}

/// Token under construction.
struct Pending {
    start: usize,
    kind: TokenKind,
    text: String,
}

/// Character-by-character scanner.
pub struct Lexer<'s> {
    src: &'s str,
    mode: Mode,
    pending: Option<Pending>,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str) -> Self {
        Self {
            src,
            mode: Mode::Normal,
            pending: None,
            tokens: Vec::new(),
        }
    }

    /// Scans the whole source.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        for (i, ch) in self.src.char_indices() {
            match self.mode {
                Mode::Slot => self.scan_slot(i, ch)?,
                Mode::BlockComment => self.scan_block_comment(i, ch),
                Mode::LineComment => self.scan_line_comment(i, ch),
                Mode::Normal => self.scan_normal(i, ch)?,
            }
        }

        let start = self.pending.as_ref().map(|p| p.start).unwrap_or(0);
        match self.mode {
            Mode::Slot => {
                return Err(CompileError::UnterminatedSlot {
                    at: Location::of(self.src, start),
                })
            }
            Mode::BlockComment => {
                return Err(CompileError::UnterminatedComment {
                    at: Location::of(self.src, start),
                })
            }
            Mode::LineComment | Mode::Normal => self.flush(self.src.len()),
        }

        tracing::trace!(tokens = self.tokens.len(), "lexed statechart source");
        Ok(self.tokens)
    }

    fn scan_normal(&mut self, i: usize, ch: char) -> Result<(), CompileError> {
        if let Some(mode) = self.opener(ch) {
            // The first opener character is the last one of the pending symbol.
            let opener_start = i - 1;
            if let Some(pending) = self.pending.as_mut() {
                pending.text.pop();
            }
            self.flush(opener_start);
            let (kind, text) = match mode {
                Mode::Slot => (TokenKind::Slot, String::new()),
                _ => (TokenKind::Comment, format!("{}{}", &self.src[opener_start..i], ch)),
            };
            self.pending = Some(Pending {
                start: opener_start,
                kind,
                text,
            });
            self.mode = mode;
            return Ok(());
        }

        let kind = classify(ch).ok_or_else(|| CompileError::UnrecognizedCharacter {
            ch,
            at: Location::of(self.src, i),
        })?;

        match self.pending.as_mut() {
            Some(pending) if pending.kind == kind => pending.text.push(ch),
            _ => {
                self.flush(i);
                self.pending = Some(Pending {
                    start: i,
                    kind,
                    text: ch.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the mode opened by `ch` together with the pending symbol's last character.
    fn opener(&self, ch: char) -> Option<Mode> {
        let pending = self.pending.as_ref()?;
        if pending.kind != TokenKind::Symbol {
            return None;
        }
        match (pending.text.chars().last()?, ch) {
            ('/', '*') => Some(Mode::BlockComment),
            ('/', '/') => Some(Mode::LineComment),
            ('$', '{') => Some(Mode::Slot),
            _ => None,
        }
    }

    fn scan_slot(&mut self, i: usize, ch: char) -> Result<(), CompileError> {
        let Some(pending) = self.pending.take() else {
            self.mode = Mode::Normal;
            return Ok(());
        };

        if ch == '}' {
            if pending.text.is_empty() {
                return Err(CompileError::EmptySlot {
                    at: Location::of(self.src, pending.start),
                });
            }
            let index = pending.text.parse::<usize>().unwrap_or(usize::MAX);
            self.tokens.push(Token {
                start: pending.start,
                end: i + ch.len_utf8(),
                value: TokenValue::Slot(index),
                kind: TokenKind::Slot,
            });
            self.mode = Mode::Normal;
            return Ok(());
        }

        let mut pending = pending;
        if ch.is_ascii_digit() {
            pending.text.push(ch);
        }
        self.pending = Some(pending);
        Ok(())
    }

    fn scan_block_comment(&mut self, i: usize, ch: char) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.text.push(ch);
        // "/*/" opens and must not close.
        if pending.text.len() >= 4 && pending.text.ends_with("*/") {
            self.flush(i + ch.len_utf8());
            self.mode = Mode::Normal;
        }
    }

    fn scan_line_comment(&mut self, i: usize, ch: char) {
        if ch == '\n' {
            self.flush(i);
            self.pending = Some(Pending {
                start: i,
                kind: TokenKind::Whitespace,
                text: ch.to_string(),
            });
            self.mode = Mode::Normal;
        } else if let Some(pending) = self.pending.as_mut() {
            pending.text.push(ch);
        }
    }

    /// Closes the pending token at `end`, reclassifying keywords.
    fn flush(&mut self, end: usize) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.text.is_empty() {
            return;
        }
        let kind = if pending.kind == TokenKind::Word && is_keyword(&pending.text) {
            TokenKind::Keyword
        } else {
            pending.kind
        };
        self.tokens.push(Token {
            start: pending.start,
            end,
            value: TokenValue::Text(pending.text),
            kind,
        });
    }
}

fn classify(ch: char) -> Option<TokenKind> {
    match ch {
        '@' => Some(TokenKind::Keyword),
        '.' | '*' | '_' => Some(TokenKind::Word),
        c if c.is_alphanumeric() => Some(TokenKind::Word),
        c if c.is_whitespace() => Some(TokenKind::Whitespace),
        c if c.is_control() => None,
        _ => Some(TokenKind::Symbol),
    }
}

/// Lexes statechart source into tokens.
pub fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds_and_text(src: &str) -> Vec<(TokenKind, String)> {
        lex(src)
            .unwrap()
            .into_iter()
            .map(|t| {
                let text = match t.value {
                    TokenValue::Text(s) => s,
                    TokenValue::Slot(i) => format!("#{}", i),
                };
                (t.kind, text)
            })
            .collect()
    }

    #[test]
    fn test_machine_header() {
        let tokens = kinds_and_text("main machine m {");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Word, "main".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Keyword, "machine".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Word, "m".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Symbol, "{".to_string()),
            ]
        );
    }

    #[test]
    fn test_at_is_keyword() {
        let tokens = kinds_and_text("@enter");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "@".to_string()),
                (TokenKind::Word, "enter".to_string()),
            ]
        );
    }

    #[test]
    fn test_handler_with_slot() {
        let tokens = kinds_and_text("on:GO ${12}");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "on".to_string()),
                (TokenKind::Symbol, ":".to_string()),
                (TokenKind::Word, "GO".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Slot, "#12".to_string()),
            ]
        );
    }

    #[test]
    fn test_slot_directly_after_symbol() {
        let tokens = kinds_and_text(":${3}}");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Symbol, ":".to_string()),
                (TokenKind::Slot, "#3".to_string()),
                (TokenKind::Symbol, "}".to_string()),
            ]
        );
    }

    #[test]
    fn test_slot_offsets() {
        let tokens = lex("a ${0}").unwrap();
        let slot = tokens.last().unwrap();
        assert_eq!(slot.slot(), Some(0));
        assert_eq!((slot.start, slot.end), (2, 6));
    }

    #[test]
    fn test_alias_and_wildcard_are_words() {
        let tokens = kinds_and_text("*other on:*");
        assert_eq!(tokens[0], (TokenKind::Word, "*other".to_string()));
        assert_eq!(tokens.last().unwrap(), &(TokenKind::Word, "*".to_string()));
    }

    #[test]
    fn test_block_comment_is_one_token() {
        let tokens = kinds_and_text("a /* x * y */ b");
        assert_eq!(tokens[2], (TokenKind::Comment, "/* x * y */".to_string()));
        assert_eq!(tokens[4], (TokenKind::Word, "b".to_string()));
    }

    #[test]
    fn test_block_comment_after_brace() {
        let tokens = kinds_and_text("{/* c */}");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Symbol, "{".to_string()),
                (TokenKind::Comment, "/* c */".to_string()),
                (TokenKind::Symbol, "}".to_string()),
            ]
        );
    }

    #[test]
    fn test_line_comment_ends_at_newline() {
        let tokens = kinds_and_text("a // note\nb");
        assert_eq!(tokens[2], (TokenKind::Comment, "// note".to_string()));
        assert_eq!(tokens[3], (TokenKind::Whitespace, "\n".to_string()));
        assert_eq!(tokens[4], (TokenKind::Word, "b".to_string()));
    }

    #[test]
    fn test_line_comment_at_end_of_input() {
        let tokens = kinds_and_text("a // trailing");
        assert_eq!(tokens.last().unwrap().0, TokenKind::Comment);
    }

    #[test]
    fn test_keywords_reclassified() {
        for kw in ["machine", "state", "initial", "final", "on", "wait", "is"] {
            let tokens = lex(kw).unwrap();
            assert_eq!(tokens[0].kind, TokenKind::Keyword, "{}", kw);
        }
        assert_eq!(lex("main").unwrap()[0].kind, TokenKind::Word);
    }

    #[test]
    fn test_duration_word() {
        let tokens = kinds_and_text("wait:1.5s");
        assert_eq!(tokens[2], (TokenKind::Word, "1.5s".to_string()));
    }

    #[test]
    fn test_control_character_rejected() {
        let err = lex("machine m {\n\u{7}}").unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnrecognizedCharacter {
                ch: '\u{7}',
                at: Location { line: 2, col: 1 }
            }
        ));
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(matches!(
            lex("a /* never closed"),
            Err(CompileError::UnterminatedComment { .. })
        ));
        assert!(matches!(
            lex("/*/"),
            Err(CompileError::UnterminatedComment { .. })
        ));
    }

    #[test]
    fn test_unterminated_and_empty_slot() {
        assert!(matches!(
            lex("on:GO ${1"),
            Err(CompileError::UnterminatedSlot { .. })
        ));
        assert!(matches!(lex("on:GO ${}"), Err(CompileError::EmptySlot { .. })));
    }

    #[test]
    fn test_empty_source() {
        assert!(lex("").unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_tokens_cover_source(src in "[a-z@:{}; \n.*]{0,64}") {
            let tokens = lex(&src).unwrap();
            let mut pos = 0;
            for token in &tokens {
                prop_assert_eq!(token.start, pos);
                prop_assert!(token.end > token.start);
                pos = token.end;
            }
            prop_assert_eq!(pos, src.len());
        }

        #[test]
        fn prop_adjacent_tokens_differ_in_kind(src in "[a-z :{}]{0,64}") {
            let tokens = lex(&src).unwrap();
            for pair in tokens.windows(2) {
                let a = if pair[0].kind == TokenKind::Keyword { TokenKind::Word } else { pair[0].kind };
                let b = if pair[1].kind == TokenKind::Keyword { TokenKind::Word } else { pair[1].kind };
                prop_assert_ne!(a, b);
            }
        }
    }
}

//! Recursive-descent parser for Cython modules.
//!
//! The parser is deliberately shallow: it understands declarations and
//! imports, skips function bodies after their docstring, and keeps every
//! other statement as an opaque node. Statement-level syntax errors never
//! abort a parse; only lexer errors do.

mod error;
mod guards;
mod params;
mod recovery;
mod stmt;

pub use error::{ParseError, ParseErrorKind, ParseFailure};
pub use guards::{DepthCounter, LoopGuard, MAX_PARSE_DEPTH};

use crate::parser::ast::{SourceModule, Unsupported};
use crate::parser::lexer::{LexError, Lexer};
use crate::parser::token::{Span, Token};

/// Parser state
pub struct Parser<'a> {
    source: &'a str,

    /// Pre-tokenized input, always terminated by `Eof`
    tokens: Vec<(Token, Span)>,

    /// Current position in token stream
    pos: usize,

    /// Nesting of class/property bodies
    pub(crate) depth: DepthCounter,
}

impl<'a> Parser<'a> {
    /// Create a new parser from source code.
    pub fn new(source: &'a str) -> Result<Self, Vec<LexError>> {
        let mut tokens = Lexer::new(source).tokenize()?;

        if !matches!(tokens.last(), Some((Token::Eof, _))) {
            let eof_span = match tokens.last() {
                Some((_, last)) => Span::new(last.end, last.end, last.line, last.column),
                None => Span::new(0, 0, 1, 1),
            };
            tokens.push((Token::Eof, eof_span));
        }

        Ok(Self {
            source,
            tokens,
            pos: 0,
            depth: DepthCounter::default(),
        })
    }

    /// Parse the whole source file.
    pub fn parse(mut self) -> SourceModule {
        let start_span = self.current_span();
        let body = stmt::parse_statements(&mut self);
        let span = match body.last() {
            Some(last) => start_span.merge(last.span()),
            None => start_span,
        };
        SourceModule { body, span }
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    #[inline]
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    #[inline]
    pub fn current_span(&self) -> Span {
        self.tokens[self.pos].1
    }

    /// Peek `n` tokens ahead (`peek_nth(0)` is the current token).
    #[inline]
    pub fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].0
    }

    /// Span of the token `n` ahead.
    pub fn span_nth(&self, n: usize) -> Span {
        let last = self.tokens.len() - 1;
        self.tokens[(self.pos + n).min(last)].1
    }

    #[inline]
    pub fn peek(&self) -> &Token {
        self.peek_nth(1)
    }

    /// Span of the most recently consumed token.
    pub fn previous_span(&self) -> Span {
        if self.pos == 0 {
            self.current_span()
        } else {
            self.tokens[self.pos - 1].1
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn rewind(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len() - 1);
    }

    /// Advance to the next token, returning the previous current token.
    pub fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Check if the current token has the same kind as `expected`.
    #[inline]
    pub fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(expected)
    }

    /// Check if the current token is the identifier `word`.
    #[inline]
    pub fn check_ident(&self, word: &str) -> bool {
        self.current().ident() == Some(word)
    }

    #[inline]
    pub fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    /// Consume the current token if it has the kind of `expected`.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn eat_ident(&mut self, word: &str) -> bool {
        if self.check_ident(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: Token) -> Result<Token, ParseError> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected_token(vec![expected]))
        }
    }

    pub fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        let span = self.current_span();
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.unexpected_token(vec![Token::Identifier(String::new())])),
        }
    }

    /// Require the end of a simple statement without consuming it.
    pub fn expect_statement_end(&self) -> Result<(), ParseError> {
        if self.current().is_line_end() || self.check(&Token::Semicolon) {
            Ok(())
        } else {
            Err(self.unexpected_token(vec![Token::Newline]))
        }
    }

    pub fn unexpected_token(&self, expected: Vec<Token>) -> ParseError {
        if self.at_eof() {
            ParseError::unexpected_eof(expected, self.current_span())
        } else {
            ParseError::unexpected_token(expected, self.current().clone(), self.current_span())
        }
    }

    // ========================================================================
    // Source text
    // ========================================================================

    /// Consume tokens up to (not including) the first one at bracket depth
    /// zero for which `stop(token, taken_so_far)` holds.
    ///
    /// Never crosses the end of a logical line or an unmatched closing
    /// bracket.
    pub fn take_until(&mut self, mut stop: impl FnMut(&Token, usize) -> bool) -> Vec<(Token, Span)> {
        let mut depth = 0usize;
        let mut taken = Vec::new();
        loop {
            let tok = self.current();
            if matches!(tok, Token::Eof) || (depth == 0 && tok.is_line_end()) {
                break;
            }
            if depth == 0 && stop(tok, taken.len()) {
                break;
            }
            if tok.is_open_bracket() {
                depth += 1;
            } else if tok.is_close_bracket() {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            taken.push((tok.clone(), self.current_span()));
            self.advance();
        }
        taken
    }

    /// Source text covered by `tokens`, whitespace-normalized.
    pub fn text_of(&self, tokens: &[(Token, Span)]) -> Option<String> {
        let (first, last) = (tokens.first()?, tokens.last()?);
        Some(self.text_between(first.1.start, last.1.end))
    }

    /// Like [`take_until`](Self::take_until), returning the source text.
    pub fn text_until(&mut self, stop: impl FnMut(&Token, usize) -> bool) -> Option<String> {
        let taken = self.take_until(stop);
        self.text_of(&taken)
    }

    pub fn text_between(&self, start: usize, end: usize) -> String {
        let end = end.min(self.source.len());
        let start = start.min(end);
        normalize_source_text(&self.source[start..end])
    }

    /// Opaque node covering everything from `start` to the last consumed token.
    pub(crate) fn unsupported_from(&self, start: Span, reason: Option<String>) -> Unsupported {
        let end = self.previous_span().end.max(start.end);
        let raw = &self.source[start.start.min(end)..end.min(self.source.len())];
        let text = raw.lines().next().unwrap_or_default().trim_end().to_string();
        Unsupported {
            text,
            reason,
            span: Span::new(start.start, end, start.line, start.column),
        }
    }
}

/// Collapse runs of whitespace (including newlines inside brackets) to a
/// single space and drop comments. Quoted text is copied as written.
fn normalize_source_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '#' => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
                pending_space = true;
            }
            '\\' if chars.peek() == Some(&'\n') => {
                pending_space = true;
            }
            c if c.is_whitespace() => pending_space = true,
            _ => {
                let after_open = out.ends_with(['(', '[', '{']);
                let before_close = matches!(c, ')' | ']' | '}' | ',');
                if pending_space && !out.is_empty() && !after_open && !before_close {
                    out.push(' ');
                }
                pending_space = false;
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_new_and_advance() {
        let mut parser = Parser::new("cdef int x").unwrap();
        assert!(matches!(parser.current(), Token::Cdef));
        let tok = parser.advance();
        assert!(matches!(tok, Token::Cdef));
        assert_eq!(parser.current().ident(), Some("int"));
    }

    #[test]
    fn test_parser_appends_eof() {
        let parser = Parser::new("").unwrap();
        assert!(parser.at_eof());
    }

    #[test]
    fn test_take_until_respects_brackets() {
        let mut parser = Parser::new("Dict[str, int], y").unwrap();
        let text = parser.text_until(|tok, _| matches!(tok, Token::Comma));
        assert_eq!(text.as_deref(), Some("Dict[str, int]"));
        assert!(parser.check(&Token::Comma));
    }

    #[test]
    fn test_normalize_source_text() {
        assert_eq!(
            normalize_source_text("Tuple[\n    int,  # first\n    str]"),
            "Tuple[int, str]"
        );
        assert_eq!(normalize_source_text("'a  #b'"), "'a  #b'");
    }
}

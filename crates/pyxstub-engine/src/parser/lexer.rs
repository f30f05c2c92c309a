//! Lexer for Cython source.
//!
//! Layout (newlines, indentation, comments, continuations) and string
//! literals are scanned by hand; every other token is produced by a
//! logos-generated matcher. The output is a flat token stream with
//! `Newline`/`Indent`/`Dedent` markers in the Python style.

use crate::parser::token::{Span, StringLit, Token};
use logos::Logos;

/// Width a tab advances the indentation to (next multiple of this).
const TAB_WIDTH: usize = 8;

/// Logos-based token enum for lexing.
///
/// Converted to the public `Token` enum after lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
enum LogosToken {
    // Whitespace (skip)
    #[regex(r"[ \t\x0c]+", logos::skip)]
    Whitespace,

    // Keywords (must come before identifiers)
    #[token("def")]
    Def,

    #[token("cdef")]
    Cdef,

    #[token("cpdef")]
    Cpdef,

    #[token("class")]
    Class,

    #[token("ctypedef")]
    Ctypedef,

    #[token("async")]
    Async,

    #[token("import")]
    Import,

    #[token("cimport")]
    Cimport,

    #[token("from")]
    From,

    #[token("as")]
    As,

    // Identifiers (must come after keywords)
    #[regex(r"[\p{XID_Start}_]\p{XID_Continue}*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Numbers are kept as written; they only ever appear in default values
    #[regex(r"0[xX][0-9a-fA-F_]+[lLuU]*", |lex| lex.slice().to_string())]
    #[regex(r"0[oO][0-7_]+", |lex| lex.slice().to_string())]
    #[regex(r"0[bB][01_]+", |lex| lex.slice().to_string())]
    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9]+)?[jJlLuU]*", |lex| lex.slice().to_string())]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?[jJ]?", |lex| lex.slice().to_string())]
    Number(String),

    #[token("->")]
    Arrow,

    #[token("**")]
    StarStar,

    #[token("...")]
    Ellipsis,

    #[regex(r"==|!=|<=|>=|<<=|>>=|<<|>>|//=|//|\*\*=|\+=|-=|\*=|/=|%=|&=|\|=|\^=|@=|:=|<>|[-+%&|^~<>!?]", |lex| lex.slice().to_string())]
    Operator(String),

    // Single-character tokens
    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("=")]
    Equal,

    #[token(".")]
    Dot,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token("@")]
    At,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { char: char, span: Span },
    UnterminatedString { span: Span },
    InconsistentDedent { span: Span },
    UnclosedBracket { open: char, span: Span },
    UnmatchedBracket { close: char, span: Span },
}

/// Bracket bookkeeping: newlines inside brackets do not end a logical line.
struct OpenBracket {
    open: char,
    span: Span,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::with_capacity(source.len() / 4),
            errors: Vec::new(),
        }
    }

    /// Format all errors with source context
    pub fn format_errors(errors: &[LexError], source: &str) -> String {
        errors
            .iter()
            .map(|e| e.format_with_source(source))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tokenize(mut self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let bytes = self.source.as_bytes();
        let mut pos = 0;
        let mut line = 1u32;
        let mut column = 1u32;

        let mut indents: Vec<usize> = vec![0];
        let mut brackets: Vec<OpenBracket> = Vec::new();
        let mut at_line_start = true;
        let mut line_has_tokens = false;

        while pos < bytes.len() {
            // Measure indentation at the start of every logical line. Blank
            // and comment-only lines never affect the indentation stack.
            if at_line_start && brackets.is_empty() {
                let mut width = 0usize;
                let mut p = pos;
                while p < bytes.len() {
                    match bytes[p] {
                        b' ' => width += 1,
                        b'\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                        b'\x0c' => width = 0,
                        _ => break,
                    }
                    p += 1;
                }

                if p >= bytes.len() {
                    pos = p;
                    break;
                }

                match bytes[p] {
                    b'\n' => {
                        pos = p + 1;
                        line += 1;
                        column = 1;
                        continue;
                    }
                    b'\r' => {
                        pos = p + 1;
                        if pos < bytes.len() && bytes[pos] == b'\n' {
                            pos += 1;
                        }
                        line += 1;
                        column = 1;
                        continue;
                    }
                    b'#' => {
                        pos = p;
                        while pos < bytes.len() && bytes[pos] != b'\n' {
                            pos += 1;
                        }
                        continue;
                    }
                    _ => {}
                }

                column += (p - pos) as u32;
                pos = p;
                let span = Span::new(pos, pos, line, column);

                let top = indents.last().copied().unwrap_or(0);
                if width > top {
                    indents.push(width);
                    self.tokens.push((Token::Indent, span));
                } else {
                    while width < indents.last().copied().unwrap_or(0) {
                        indents.pop();
                        self.tokens.push((Token::Dedent, span));
                    }
                    if width != indents.last().copied().unwrap_or(0) {
                        self.errors.push(LexError::InconsistentDedent { span });
                    }
                }
                at_line_start = false;
            }

            match bytes[pos] {
                b' ' | b'\t' | b'\x0c' => {
                    pos += 1;
                    column += 1;
                    continue;
                }
                b'\r' => {
                    pos += 1;
                    continue;
                }
                b'\n' => {
                    if brackets.is_empty() {
                        if line_has_tokens {
                            let span = Span::new(pos, pos, line, column);
                            self.tokens.push((Token::Newline, span));
                            line_has_tokens = false;
                        }
                        at_line_start = true;
                    }
                    pos += 1;
                    line += 1;
                    column = 1;
                    continue;
                }
                b'#' => {
                    while pos < bytes.len() && bytes[pos] != b'\n' {
                        pos += 1;
                    }
                    continue;
                }
                b'\\' => {
                    // Explicit line continuation
                    let mut next = pos + 1;
                    if next < bytes.len() && bytes[next] == b'\r' {
                        next += 1;
                    }
                    if next < bytes.len() && bytes[next] == b'\n' {
                        pos = next + 1;
                        line += 1;
                        column = 1;
                        continue;
                    }
                }
                _ => {}
            }

            // String literals are scanned by hand (prefixes, triple quotes)
            if let Some(prefix_len) = self.string_start(pos) {
                match self.lex_string(pos, prefix_len, line, column) {
                    Ok((lit, end)) => {
                        self.tokens.push((
                            Token::StringLiteral(lit),
                            Span::new(pos, end, line, column),
                        ));
                        advance_position(&self.source[pos..end], &mut line, &mut column);
                        pos = end;
                    }
                    Err(err) => {
                        self.errors.push(err);
                        // Skip to end of line for error recovery
                        while pos < bytes.len() && bytes[pos] != b'\n' {
                            pos += 1;
                        }
                    }
                }
                line_has_tokens = true;
                continue;
            }

            // Use logos for regular tokens
            let mut logos_lexer = LogosToken::lexer(&self.source[pos..]);

            if let Some(token_result) = logos_lexer.next() {
                let range = logos_lexer.span();
                let abs_start = pos + range.start;
                let abs_end = pos + range.end;
                let span = Span::new(abs_start, abs_end, line, column);

                match token_result {
                    Ok(logos_token) => {
                        let token = convert_token(logos_token);
                        self.track_bracket(&token, span, &mut brackets);
                        self.tokens.push((token, span));
                        line_has_tokens = true;
                    }
                    Err(_) => {
                        let char = self.source[abs_start..].chars().next().unwrap_or('\0');
                        self.errors.push(LexError::UnexpectedCharacter { char, span });
                    }
                }

                let consumed = abs_end.max(abs_start + 1).min(self.source.len());
                advance_position(&self.source[pos..consumed], &mut line, &mut column);
                pos = consumed;
                // Keep `pos` on a char boundary after an unexpected multi-byte character
                while pos < self.source.len() && !self.source.is_char_boundary(pos) {
                    pos += 1;
                }
            } else {
                break;
            }
        }

        if let Some(open) = brackets.last() {
            self.errors.push(LexError::UnclosedBracket {
                open: open.open,
                span: open.span,
            });
        }

        let eof_span = Span::new(self.source.len(), self.source.len(), line, column);
        if line_has_tokens {
            self.tokens.push((Token::Newline, eof_span));
        }
        while indents.len() > 1 {
            indents.pop();
            self.tokens.push((Token::Dedent, eof_span));
        }
        self.tokens.push((Token::Eof, eof_span));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn track_bracket(&mut self, token: &Token, span: Span, brackets: &mut Vec<OpenBracket>) {
        let open = match token {
            Token::LeftParen => Some('('),
            Token::LeftBracket => Some('['),
            Token::LeftBrace => Some('{'),
            _ => None,
        };
        if let Some(open) = open {
            brackets.push(OpenBracket { open, span });
            return;
        }

        let (close, expected) = match token {
            Token::RightParen => (')', '('),
            Token::RightBracket => (']', '['),
            Token::RightBrace => ('}', '{'),
            _ => return,
        };
        match brackets.last() {
            Some(top) if top.open == expected => {
                brackets.pop();
            }
            _ => self.errors.push(LexError::UnmatchedBracket { close, span }),
        }
    }

    /// Returns the prefix length if a string literal starts at `pos`.
    fn string_start(&self, pos: usize) -> Option<usize> {
        let bytes = self.source.as_bytes();
        let mut p = pos;
        while p < bytes.len() && p - pos < 2 && matches!(bytes[p], b'r' | b'R' | b'b' | b'B' | b'u' | b'U' | b'f' | b'F') {
            p += 1;
        }
        if p < bytes.len() && (bytes[p] == b'"' || bytes[p] == b'\'') {
            Some(p - pos)
        } else {
            None
        }
    }

    fn lex_string(
        &self,
        start: usize,
        prefix_len: usize,
        line: u32,
        column: u32,
    ) -> Result<(StringLit, usize), LexError> {
        let bytes = self.source.as_bytes();
        let quote = bytes[start + prefix_len];
        let mut pos = start + prefix_len + 1;
        let triple = pos + 1 < bytes.len() && bytes[pos] == quote && bytes[pos + 1] == quote;
        if triple {
            pos += 2;
        }
        let content_start = pos;

        while pos < bytes.len() {
            let ch = bytes[pos];
            if ch == b'\\' {
                pos += 2;
                continue;
            }
            if ch == b'\n' && !triple {
                break;
            }
            if ch == quote {
                if !triple {
                    return Ok((self.make_literal(start, prefix_len, content_start, pos, false), pos + 1));
                }
                if pos + 2 < bytes.len() && bytes[pos + 1] == quote && bytes[pos + 2] == quote {
                    return Ok((self.make_literal(start, prefix_len, content_start, pos, true), pos + 3));
                }
            }
            pos += 1;
        }

        Err(LexError::UnterminatedString {
            span: Span::new(start, pos.min(bytes.len()), line, column),
        })
    }

    fn make_literal(&self, start: usize, prefix_len: usize, from: usize, to: usize, triple: bool) -> StringLit {
        StringLit {
            value: self.source[from..to].to_string(),
            prefix: self.source[start..start + prefix_len].to_ascii_lowercase(),
            triple,
        }
    }
}

fn convert_token(logos_token: LogosToken) -> Token {
    match logos_token {
        LogosToken::Def => Token::Def,
        LogosToken::Cdef => Token::Cdef,
        LogosToken::Cpdef => Token::Cpdef,
        LogosToken::Class => Token::Class,
        LogosToken::Ctypedef => Token::Ctypedef,
        LogosToken::Async => Token::Async,
        LogosToken::Import => Token::Import,
        LogosToken::Cimport => Token::Cimport,
        LogosToken::From => Token::From,
        LogosToken::As => Token::As,
        LogosToken::Identifier(s) => Token::Identifier(s),
        LogosToken::Number(s) => Token::Number(s),
        LogosToken::Arrow => Token::Arrow,
        LogosToken::StarStar => Token::StarStar,
        LogosToken::Ellipsis => Token::Ellipsis,
        LogosToken::Operator(s) => Token::Operator(s),
        LogosToken::Star => Token::Star,
        LogosToken::Slash => Token::Slash,
        LogosToken::Equal => Token::Equal,
        LogosToken::Dot => Token::Dot,
        LogosToken::Colon => Token::Colon,
        LogosToken::Semicolon => Token::Semicolon,
        LogosToken::Comma => Token::Comma,
        LogosToken::At => Token::At,
        LogosToken::LeftParen => Token::LeftParen,
        LogosToken::RightParen => Token::RightParen,
        LogosToken::LeftBracket => Token::LeftBracket,
        LogosToken::RightBracket => Token::RightBracket,
        LogosToken::LeftBrace => Token::LeftBrace,
        LogosToken::RightBrace => Token::RightBrace,
        LogosToken::Whitespace => unreachable!("Whitespace should be skipped"),
    }
}

fn advance_position(text: &str, line: &mut u32, column: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

impl LexError {
    /// Get the span of this error
    pub fn span(&self) -> &Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::InconsistentDedent { span }
            | LexError::UnclosedBracket { span, .. }
            | LexError::UnmatchedBracket { span, .. } => span,
        }
    }

    /// Get a description of this error
    pub fn description(&self) -> String {
        match self {
            LexError::UnexpectedCharacter { char, .. } => {
                format!("Unexpected character '{}'", char)
            }
            LexError::UnterminatedString { .. } => "Unterminated string literal".to_string(),
            LexError::InconsistentDedent { .. } => {
                "Unindent does not match any outer indentation level".to_string()
            }
            LexError::UnclosedBracket { open, .. } => format!("Unclosed '{}'", open),
            LexError::UnmatchedBracket { close, .. } => format!("Unmatched '{}'", close),
        }
    }

    /// Get a hint for fixing this error
    pub fn hint(&self) -> Option<String> {
        match self {
            LexError::UnterminatedString { .. } => {
                Some("Add a closing quote to terminate the string".to_string())
            }
            LexError::InconsistentDedent { .. } => {
                Some("Align the line with an enclosing block".to_string())
            }
            _ => None,
        }
    }

    /// Format the error with source context
    pub fn format_with_source(&self, source: &str) -> String {
        let span = self.span();
        let mut result = format!(
            "Error at {}:{}: {}\n",
            span.line,
            span.column,
            self.description()
        );

        if let Some(error_line) = source.lines().nth(span.line.saturating_sub(1) as usize) {
            result.push_str("  |\n");
            result.push_str(&format!("{:3} | {}\n", span.line, error_line));
            result.push_str(&format!(
                "  | {}^\n",
                " ".repeat(span.column.saturating_sub(1) as usize)
            ));
        }

        if let Some(hint) = self.hint() {
            result.push_str(&format!("\nHint: {}\n", hint));
        }

        result
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.description(),
            self.span().line,
            self.span().column
        )
    }
}

impl std::error::Error for LexError {}

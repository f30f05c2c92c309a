//! Parse error types

use crate::parser::lexer::LexError;
use crate::parser::token::{Span, Token};
use thiserror::Error;

/// A statement-level parse error.
///
/// These are always recovered: the statement is kept as an opaque node
/// and parsing resumes at the next logical line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Parse error at {}:{}: {message}", span.line, span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub message: String,
}

/// The kind of parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: Vec<Token>, found: Token },
    UnexpectedEof { expected: Vec<Token> },
    InvalidSyntax { reason: String },
    /// Loop or nesting limit exceeded
    ParserLimitExceeded { message: String },
    /// Position did not advance
    ParserStuck { message: String },
}

impl ParseError {
    pub fn unexpected_token(expected: Vec<Token>, found: Token, span: Span) -> Self {
        let message = if expected.len() == 1 {
            format!("expected '{}', found '{}'", expected[0], found)
        } else {
            let names: Vec<String> = expected.iter().map(|t| format!("'{}'", t)).collect();
            format!("expected one of {}, found '{}'", names.join(", "), found)
        };
        Self {
            kind: ParseErrorKind::UnexpectedToken { expected, found },
            span,
            message,
        }
    }

    pub fn unexpected_eof(expected: Vec<Token>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::UnexpectedEof { expected },
            span,
            message: "unexpected end of file".to_string(),
        }
    }

    pub fn invalid_syntax(reason: impl Into<String>, span: Span) -> Self {
        let reason = reason.into();
        Self {
            message: reason.clone(),
            kind: ParseErrorKind::InvalidSyntax { reason },
            span,
        }
    }

    pub fn parser_limit_exceeded(message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        Self {
            kind: ParseErrorKind::ParserLimitExceeded {
                message: message.clone(),
            },
            span,
            message: format!("parser limit exceeded: {}", message),
        }
    }

    pub fn parser_stuck(message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        Self {
            kind: ParseErrorKind::ParserStuck {
                message: message.clone(),
            },
            span,
            message: format!("parser stuck: {}", message),
        }
    }
}

/// The source could not be turned into a syntax tree at all.
///
/// Fatal for the module it belongs to.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseFailure {
    pub message: String,
    pub errors: Vec<LexError>,
}

impl ParseFailure {
    pub fn from_lex_errors(errors: Vec<LexError>) -> Self {
        let message = match errors.first() {
            Some(first) if errors.len() > 1 => {
                format!("{} (and {} more lexical errors)", first, errors.len() - 1)
            }
            Some(first) => first.to_string(),
            None => "source could not be tokenized".to_string(),
        };
        Self { message, errors }
    }

    /// Span of the first error, for diagnostics.
    pub fn span(&self) -> Option<Span> {
        self.errors.first().map(|e| *e.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_token_message() {
        let err = ParseError::unexpected_token(
            vec![Token::Colon],
            Token::Comma,
            Span::new(4, 5, 1, 5),
        );
        assert_eq!(err.message, "expected ':', found ','");
        assert_eq!(err.to_string(), "Parse error at 1:5: expected ':', found ','");
    }

    #[test]
    fn test_parse_failure_counts_extra_errors() {
        let span = Span::new(0, 1, 1, 1);
        let failure = ParseFailure::from_lex_errors(vec![
            LexError::UnterminatedString { span },
            LexError::UnexpectedCharacter { char: '$', span },
        ]);
        assert!(failure.message.contains("and 1 more"));
        assert_eq!(failure.span(), Some(span));
    }
}

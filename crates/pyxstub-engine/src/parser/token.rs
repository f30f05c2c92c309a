//! Token definitions for Cython source.
//!
//! Only the keywords that shape declarations get their own variant. Soft
//! keywords (`public`, `readonly`, `nogil`, `property`, ...) stay
//! identifiers and are matched by text in the parser.

use std::fmt;

/// A token in Cython source code.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Declaration keywords
    Def,
    Cdef,
    Cpdef,
    Class,
    Ctypedef,
    Async,

    // Imports
    Import,
    Cimport,
    From,
    As,

    // Literals
    Number(String),
    StringLiteral(StringLit),

    // Identifiers (including soft keywords)
    Identifier(String),

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Ellipsis,
    At,
    Arrow,
    Equal,
    Star,
    StarStar,
    Slash,

    /// Any other operator, kept as written (`|`, `==`, `<`, `?`, ...)
    Operator(String),

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A string literal as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLit {
    /// Raw text between the quotes (escapes are kept verbatim)
    pub value: String,
    /// Lowercased prefix letters (`r`, `b`, `f`, `u`, `rb`, ...)
    pub prefix: String,
    /// Whether the literal used triple quotes
    pub triple: bool,
}

impl StringLit {
    /// Byte strings and f-strings never act as docstrings.
    pub fn is_doc_candidate(&self) -> bool {
        !self.prefix.contains('b') && !self.prefix.contains('f')
    }
}

/// Source location information for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Create a span that covers both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }
}

impl Token {
    /// Returns true for tokens that close a logical line or a block.
    pub fn is_line_end(&self) -> bool {
        matches!(self, Token::Newline | Token::Dedent | Token::Eof)
    }

    /// Returns true if this token opens a bracket pair.
    pub fn is_open_bracket(&self) -> bool {
        matches!(self, Token::LeftParen | Token::LeftBracket | Token::LeftBrace)
    }

    /// Returns true if this token closes a bracket pair.
    pub fn is_close_bracket(&self) -> bool {
        matches!(
            self,
            Token::RightParen | Token::RightBracket | Token::RightBrace
        )
    }

    /// The identifier text, if this token is an identifier.
    pub fn ident(&self) -> Option<&str> {
        match self {
            Token::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::Cdef => write!(f, "cdef"),
            Token::Cpdef => write!(f, "cpdef"),
            Token::Class => write!(f, "class"),
            Token::Ctypedef => write!(f, "ctypedef"),
            Token::Async => write!(f, "async"),
            Token::Import => write!(f, "import"),
            Token::Cimport => write!(f, "cimport"),
            Token::From => write!(f, "from"),
            Token::As => write!(f, "as"),
            Token::Number(text) => write!(f, "{}", text),
            Token::StringLiteral(lit) => {
                let quote = if lit.triple { "\"\"\"" } else { "\"" };
                write!(f, "{}{}{}{}", lit.prefix, quote, lit.value, quote)
            }
            Token::Identifier(name) => write!(f, "{}", name),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Ellipsis => write!(f, "..."),
            Token::At => write!(f, "@"),
            Token::Arrow => write!(f, "->"),
            Token::Equal => write!(f, "="),
            Token::Star => write!(f, "*"),
            Token::StarStar => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::Operator(op) => write!(f, "{}", op),
            Token::Newline => write!(f, "<newline>"),
            Token::Indent => write!(f, "<indent>"),
            Token::Dedent => write!(f, "<dedent>"),
            Token::Eof => write!(f, "<eof>"),
        }
    }
}

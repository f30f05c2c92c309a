//! Cython source parser.
//!
//! Lexical analysis (indentation-aware tokenization) and a shallow
//! declaration parser that turns a `.pyx` module into a [`SourceModule`].
//!
//! # Example
//!
//! ```ignore
//! use pyxstub_engine::parser::parse_module;
//!
//! let module = parse_module("cpdef int f(int x):\n    return x\n")?;
//! for stmt in &module.body {
//!     println!("{:?}", stmt);
//! }
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{SourceModule, Stmt};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, ParseFailure, Parser};
pub use token::{Span, Token};

/// Tokenize and parse a whole module.
///
/// Fails only if the source cannot be tokenized; statement-level syntax
/// errors are recovered into opaque nodes.
pub fn parse_module(source: &str) -> Result<SourceModule, ParseFailure> {
    let parser = Parser::new(source).map_err(ParseFailure::from_lex_errors)?;
    Ok(parser.parse())
}

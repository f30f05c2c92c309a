//! pyxstub engine
//!
//! Generates Python stub files (`.pyi`) from Cython modules (`.pyx`):
//! - **Parser**: indentation-aware lexer and a declaration-level parser (`parser` module)
//! - **Stub generation**: extraction, visibility classification, cross-module
//!   type resolution and rendering (`stubgen` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use pyxstub_engine::{Diagnostics, SourceFile, StubGenerator};
//!
//! let mut diagnostics = Diagnostics::new();
//! let stub = StubGenerator::default().generate_module(
//!     SourceFile::new("demo", "cpdef int f(int x):\n    return x\ncdef int g():\n    return 0\n"),
//!     &mut diagnostics,
//! )?;
//! assert!(stub.contains("def f(x: object) -> object: ..."));
//! assert!(!stub.contains("def g"));
//! ```

#![warn(rust_2018_idioms)]

/// Parser module: lexer, syntax tree and statement parser
pub mod parser;

/// Stub generation pipeline
pub mod stubgen;

pub use parser::{parse_module, ParseError, ParseFailure, SourceModule};
pub use stubgen::{
    DiagnosticKind, Diagnostics, ModuleOutcome, ModuleReport, PackageReport, SourceFile,
    StubConfig, StubDiagnostic, StubError, StubGenerator, StubgenOptions,
};

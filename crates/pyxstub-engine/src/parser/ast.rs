//! Syntax tree produced by the parser.
//!
//! The tree only models what a stub needs: declarations, imports and
//! string statements. Function bodies are skipped after their docstring,
//! and statements the parser does not understand are kept as
//! [`Unsupported`] nodes carrying their raw text.

use crate::parser::token::Span;

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceModule {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A statement in a module, class or property body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Function(FunctionDef),
    Class(ClassDef),
    Variable(VariableDecl),
    Import(ImportStmt),
    Property(PropertyBlock),
    Enum(EnumDef),
    /// A bare string literal statement
    Docstring(Docstring),
    /// `pass` or `...`
    Pass(Span),
    /// struct/union/ctypedef/extern/DEF/include: never part of the Python surface
    Native(NativeDecl),
    Unsupported(Unsupported),
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Function(f) => &f.span,
            Stmt::Class(c) => &c.span,
            Stmt::Variable(v) => &v.span,
            Stmt::Import(i) => &i.span,
            Stmt::Property(p) => &p.span,
            Stmt::Enum(e) => &e.span,
            Stmt::Docstring(d) => &d.span,
            Stmt::Pass(span) => span,
            Stmt::Native(n) => &n.span,
            Stmt::Unsupported(u) => &u.span,
        }
    }
}

/// How a function or variable was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
    /// `def` / plain assignment
    Python,
    /// `cdef`
    Cdef,
    /// `cpdef`
    Cpdef,
}

/// Soft keywords written between `cdef`/`cpdef` and the declarator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub public: bool,
    pub readonly: bool,
    pub api: bool,
    pub inline: bool,
    pub is_static: bool,
}

impl Modifiers {
    /// Applies a soft keyword, returning false if `word` is not a modifier.
    pub fn apply(&mut self, word: &str) -> bool {
        match word {
            "public" => self.public = true,
            "readonly" => self.readonly = true,
            "api" => self.api = true,
            "inline" => self.inline = true,
            "static" => self.is_static = true,
            _ => return false,
        }
        true
    }

    /// Merge block-level modifiers (`cdef public:`) into a line's own.
    pub fn union(self, other: Modifiers) -> Modifiers {
        Modifiers {
            public: self.public || other.public,
            readonly: self.readonly || other.readonly,
            api: self.api || other.api,
            inline: self.inline || other.inline,
            is_static: self.is_static || other.is_static,
        }
    }
}

/// `@name.attr(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    /// Dotted name as written
    pub name: String,
    /// Argument text including the parentheses, if called
    pub args: Option<String>,
    pub span: Span,
}

/// A string statement; for docstrings the value is still raw.
#[derive(Debug, Clone, PartialEq)]
pub struct Docstring {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Regular,
    /// `*args`
    VarPositional,
    /// `**kwargs`
    VarKeyword,
    /// bare `*`
    KeywordOnlyMarker,
    /// `/`
    PositionalOnlyMarker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    /// Python annotation (`x: int`)
    pub annotation: Option<String>,
    /// Native type written before the name (`int x`)
    pub native_type: Option<String>,
    pub default: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub kind: DefKind,
    pub modifiers: Modifiers,
    pub is_async: bool,
    pub decorators: Vec<Decorator>,
    pub params: Vec<Param>,
    /// `-> ann`
    pub return_annotation: Option<String>,
    /// Native return type written before the name
    pub native_return: Option<String>,
    pub doc: Option<Docstring>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// `cdef class`
    pub native: bool,
    pub modifiers: Modifiers,
    pub decorators: Vec<Decorator>,
    pub bases: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A module or class level variable: `cdef int x`, `x: int = 1`, `x = 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub kind: DefKind,
    pub modifiers: Modifiers,
    pub annotation: Option<String>,
    pub native_type: Option<String>,
    pub value: Option<String>,
    pub span: Span,
}

/// A single `name [as alias]` binding of an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStmt {
    /// `cimport` rather than `import`
    pub cimport: bool,
    /// Source module of a `from` import, leading dots included
    pub from_module: Option<String>,
    pub names: Vec<ImportName>,
    pub span: Span,
}

/// Legacy `property name:` block with `__get__`/`__set__`/`__del__`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBlock {
    pub name: String,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `cpdef enum Name:` (or any enum; `public` tells them apart).
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub public: bool,
    pub members: Vec<String>,
    pub doc: Option<Docstring>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Struct,
    Union,
    Enum,
    Fused,
    Ctypedef,
    Extern,
    Define,
    Include,
    /// `cdef:` block whose lines could not be read as variables
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeDecl {
    pub kind: NativeKind,
    pub name: Option<String>,
    pub span: Span,
}

/// A statement kept opaquely.
#[derive(Debug, Clone, PartialEq)]
pub struct Unsupported {
    /// First line of the statement's source text
    pub text: String,
    /// Why it was not understood, if parsing failed
    pub reason: Option<String>,
    pub span: Span,
}

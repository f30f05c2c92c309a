//! Diagnostics for recovered and fatal conditions.
//!
//! Every condition the pipeline recovers from is recorded as a
//! [`StubDiagnostic`] naming the module and qualified name it concerns.
//! Diagnostics render through codespan-reporting, or as JSON.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label};
pub use codespan_reporting::diagnostic::Severity;
use codespan_reporting::files::{Files, SimpleFiles};
use codespan_reporting::term;
use termcolor::WriteColor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::parser::{ParseFailure, Span};

/// Diagnostic code (e.g., "W0001")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// The module could not be tokenized; no stub is written
    ParseFailure,
    /// A statement was kept opaquely
    UnsupportedConstruct,
    /// A referenced type was replaced by the opaque type
    UnresolvedTypeReference,
    ConflictingOverride,
    /// An annotation override names no declaration
    UnknownOverrideTarget,
    /// An unrecognized decorator was removed
    DroppedDecorator,
}

impl DiagnosticKind {
    pub fn code(self) -> ErrorCode {
        match self {
            DiagnosticKind::ParseFailure => ErrorCode("E0001"),
            DiagnosticKind::UnsupportedConstruct => ErrorCode("I0001"),
            DiagnosticKind::UnresolvedTypeReference => ErrorCode("W0001"),
            DiagnosticKind::ConflictingOverride => ErrorCode("W0002"),
            DiagnosticKind::UnknownOverrideTarget => ErrorCode("W0003"),
            DiagnosticKind::DroppedDecorator => ErrorCode("I0002"),
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::ParseFailure => Severity::Error,
            DiagnosticKind::UnresolvedTypeReference
            | DiagnosticKind::ConflictingOverride
            | DiagnosticKind::UnknownOverrideTarget => Severity::Warning,
            DiagnosticKind::UnsupportedConstruct | DiagnosticKind::DroppedDecorator => {
                Severity::Note
            }
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, DiagnosticKind::ParseFailure)
    }
}

/// One recovered or fatal condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubDiagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Dotted module path
    pub module: String,
    /// Module-relative qualified name of the offending declaration
    pub qualified_name: Option<String>,
    pub span: Option<Span>,
    pub label: Option<String>,
    pub notes: Vec<String>,
}

impl StubDiagnostic {
    pub fn new(kind: DiagnosticKind, module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            module: module.into(),
            qualified_name: None,
            span: None,
            label: None,
            notes: Vec::new(),
        }
    }

    pub fn with_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = Some(qualified_name.into());
        self
    }

    /// Attach the primary source location
    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.span = Some(span);
        self.label = Some(label.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.notes.push(format!("help: {}", help.into()));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn from_parse_failure(module: impl Into<String>, failure: &ParseFailure) -> Self {
        let module = module.into();
        let mut diag = StubDiagnostic::new(
            DiagnosticKind::ParseFailure,
            module,
            format!("Cannot parse module: {}", failure.message),
        );
        if let Some(first) = failure.errors.first() {
            diag = diag.with_span(*first.span(), first.description());
            if let Some(hint) = first.hint() {
                diag = diag.with_help(hint);
            }
        }
        for error in failure.errors.iter().skip(1) {
            diag = diag.with_note(error.to_string());
        }
        diag
    }

    /// Emit a `tracing` event at the diagnostic's severity.
    pub fn log(&self) {
        let name = self.qualified_name.as_deref().unwrap_or("<module>");
        match self.severity() {
            Severity::Error | Severity::Bug => {
                tracing::error!(code = self.code().as_str(), module = %self.module, name, "{}", self.message)
            }
            Severity::Warning => {
                tracing::warn!(code = self.code().as_str(), module = %self.module, name, "{}", self.message)
            }
            _ => {
                tracing::info!(code = self.code().as_str(), module = %self.module, name, "{}", self.message)
            }
        }
    }

    /// Build the codespan diagnostic against `file_id`.
    pub fn to_codespan(&self, file_id: usize) -> CsDiagnostic<usize> {
        let mut inner = CsDiagnostic::new(self.severity())
            .with_code(self.code().as_str())
            .with_message(self.headline());
        if let Some(span) = self.span {
            let label = Label::primary(file_id, span.start..span.end)
                .with_message(self.label.clone().unwrap_or_default());
            inner = inner.with_labels(vec![label]);
        }
        inner.with_notes(self.notes.clone())
    }

    fn headline(&self) -> String {
        match &self.qualified_name {
            Some(name) => format!("{} ({}.{})", self.message, self.module, name),
            None => format!("{} ({})", self.message, self.module),
        }
    }

    /// Render to `writer` with source context.
    pub fn emit(
        &self,
        writer: &mut dyn WriteColor,
        files: &SimpleFiles<String, String>,
        file_id: usize,
    ) -> Result<(), codespan_reporting::files::Error> {
        let config = term::Config::default();
        term::emit(writer, &config, files, &self.to_codespan(file_id))
    }

    /// Convert to JSON representation for tooling
    pub fn to_json(
        &self,
        files: &SimpleFiles<String, String>,
        file_id: usize,
    ) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&JsonDiagnostic::from_diagnostic(self, files, file_id))
    }
}

/// JSON representation of a diagnostic
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    /// Diagnostic code (e.g., "W0001")
    pub code: String,
    pub severity: String,
    pub message: String,
    pub module: String,
    pub qualified_name: Option<String>,
    pub labels: Vec<JsonLabel>,
    pub notes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLabel {
    pub file: String,
    /// Start line (1-indexed)
    pub start_line: usize,
    /// Start column (1-indexed)
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub message: Option<String>,
}

impl JsonDiagnostic {
    pub fn from_diagnostic(
        diag: &StubDiagnostic,
        files: &SimpleFiles<String, String>,
        file_id: usize,
    ) -> Self {
        let severity = match diag.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Help => "help",
            Severity::Bug => "bug",
        };

        let labels = diag
            .span
            .and_then(|span| {
                let file = files.get(file_id).ok()?;
                let start = file.location((), span.start).ok()?;
                let end = file.location((), span.end).ok()?;
                Some(JsonLabel {
                    file: file.name().to_string(),
                    start_line: start.line_number,
                    start_column: start.column_number,
                    end_line: end.line_number,
                    end_column: end.column_number,
                    message: diag.label.clone(),
                })
            })
            .into_iter()
            .collect();

        JsonDiagnostic {
            code: diag.code().as_str().to_string(),
            severity: severity.to_string(),
            message: diag.message.clone(),
            module: diag.module.clone(),
            qualified_name: diag.qualified_name.clone(),
            labels,
            notes: diag.notes.clone(),
        }
    }
}

/// Diagnostics collected during one run, logged as they arrive.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<StubDiagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: StubDiagnostic) {
        diag.log();
        self.items.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StubDiagnostic> {
        self.items.iter()
    }

    /// Diagnostics concerning `module`.
    pub fn for_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a StubDiagnostic> {
        self.items.iter().filter(move |d| d.module == module)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.kind.is_fatal())
    }

    pub fn into_vec(self) -> Vec<StubDiagnostic> {
        self.items
    }
}

/// Helper to create a SimpleFiles instance from source code
pub fn create_files(
    path: impl Into<PathBuf>,
    source: impl Into<String>,
) -> SimpleFiles<String, String> {
    let mut files = SimpleFiles::new();
    files.add(path.into().display().to_string(), source.into());
    files
}

//! Stub generation pipeline.
//!
//! Extract → classify → resolve → render. Extraction and classification
//! work per module; resolution needs every module of the package
//! classified first, so [`StubGenerator::generate_package`] runs the
//! stages in that order across the whole package.
//!
//! # Example
//!
//! ```ignore
//! use pyxstub_engine::{SourceFile, StubConfig, StubGenerator};
//!
//! let generator = StubGenerator::new(StubConfig::default());
//! let report = generator.generate_package(vec![
//!     SourceFile::new("pkg.a", "cdef class T:\n    pass\n"),
//!     SourceFile::new("pkg.b", "from pkg.a cimport T\ncpdef T make(): ...\n"),
//! ]);
//! for module in &report.modules {
//!     if let Some(stub) = module.stub() {
//!         println!("{}:\n{}", module.module, stub);
//!     }
//! }
//! ```

pub mod classify;
pub mod config;
pub mod decorators;
pub mod diagnostic;
pub mod error;
pub mod extract;
pub mod graph;
pub mod model;
pub mod render;
pub mod resolve;
pub mod types;

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

pub use config::{ConfigError, ModuleOverrides, StubConfig, StubgenOptions, CONFIG_FILE};
pub use diagnostic::{
    create_files, DiagnosticKind, Diagnostics, ErrorCode, JsonDiagnostic, Severity, StubDiagnostic,
};
pub use error::{RenderError, StubError};
pub use graph::{module_name, GraphError, ModuleGraph};
pub use model::{Declaration, Module, Package, TypeReference};

use crate::parser::parse_module;
use classify::classify_module;
use extract::extract_module;
use render::render_module;
use resolve::Resolver;

/// One source module handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Dotted module path
    pub module: String,
    pub path: Option<PathBuf>,
    pub source: String,
    /// An `__init__` module
    pub is_package: bool,
}

impl SourceFile {
    pub fn new(module: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: None,
            source: source.into(),
            is_package: false,
        }
    }

    /// A file inside the package rooted at `root`; `None` if `file` is not
    /// under `root`.
    pub fn from_path(root: &Path, file: &Path, source: impl Into<String>) -> Option<Self> {
        let module = module_name(root, file)?;
        let is_package = file.file_stem().is_some_and(|stem| stem == "__init__");
        Some(Self {
            module,
            path: Some(file.to_path_buf()),
            source: source.into(),
            is_package,
        })
    }
}

#[derive(Debug)]
pub enum ModuleOutcome {
    Generated(String),
    Failed(StubError),
}

/// Result of one module of a package run.
#[derive(Debug)]
pub struct ModuleReport {
    pub module: String,
    pub path: Option<PathBuf>,
    pub outcome: ModuleOutcome,
}

impl ModuleReport {
    pub fn stub(&self) -> Option<&str> {
        match &self.outcome {
            ModuleOutcome::Generated(text) => Some(text),
            ModuleOutcome::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ModuleOutcome::Failed(_))
    }
}

/// Per-module outcomes plus every diagnostic of the run.
#[derive(Debug, Default)]
pub struct PackageReport {
    /// Ordered by module path
    pub modules: Vec<ModuleReport>,
    pub diagnostics: Diagnostics,
}

impl PackageReport {
    pub fn succeeded(&self) -> usize {
        self.modules.iter().filter(|m| !m.is_failure()).count()
    }

    pub fn failed(&self) -> usize {
        self.modules.iter().filter(|m| m.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn get(&self, module: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.module == module)
    }
}

/// Runs the stub pipeline with one configuration.
#[derive(Debug, Clone, Default)]
pub struct StubGenerator {
    config: StubConfig,
}

impl StubGenerator {
    pub fn new(config: StubConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StubConfig {
        &self.config
    }

    /// Generate the stub of a single module, treated as a package of one.
    pub fn generate_module(&self, file: SourceFile, diagnostics: &mut Diagnostics) -> Result<String, StubError> {
        let mut report = self.generate_package(vec![file]);
        diagnostics.extend(std::mem::take(&mut report.diagnostics));
        match report.modules.pop().map(|m| m.outcome) {
            Some(ModuleOutcome::Generated(text)) => Ok(text),
            Some(ModuleOutcome::Failed(error)) => Err(error),
            None => Ok(String::new()),
        }
    }

    /// Generate stubs for every module of a package.
    ///
    /// A module that fails to parse or render is reported and skipped;
    /// the others are still generated.
    pub fn generate_package(&self, files: Vec<SourceFile>) -> PackageReport {
        let options = &self.config.stubgen;
        let mut diagnostics = Diagnostics::new();
        let mut reports: Vec<ModuleReport> = Vec::new();
        tracing::info!(modules = files.len(), "generating stubs");

        let paths: Vec<String> = files.iter().map(|f| f.module.clone()).collect();
        let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

        let mut modules = Vec::with_capacity(files.len());
        for file in files {
            tracing::debug!(module = %file.module, "parsing");
            match parse_module(&file.source) {
                Ok(tree) => {
                    let mut module = extract_module(&file.module, file.source.as_str(), file.is_package, &tree);
                    module.file = file.path;
                    self.config.apply_to(&mut module, &path_refs, &mut diagnostics);
                    modules.push(module);
                }
                Err(failure) => {
                    diagnostics.push(StubDiagnostic::from_parse_failure(&file.module, &failure));
                    reports.push(ModuleReport {
                        module: file.module,
                        path: file.path,
                        outcome: ModuleOutcome::Failed(StubError::Parse(failure)),
                    });
                }
            }
        }

        let package = Package::new(modules);
        for module in &package.modules {
            classify_module(module, options, &mut diagnostics);
        }

        let graph = ModuleGraph::from_package(&package);
        let resolver = Resolver::new(&package, &graph, &options.opaque_type);
        let mut unresolvable: FxHashMap<String, GraphError> = FxHashMap::default();
        for module in &package.modules {
            if let Err(error) = resolver.resolve_module(module, &mut diagnostics) {
                tracing::warn!(module = %module.path, %error, "resolution failed");
                unresolvable.insert(module.path.clone(), error);
            }
        }

        for module in &package.modules {
            let outcome = match unresolvable.remove(&module.path) {
                Some(error) => ModuleOutcome::Failed(StubError::Graph(error)),
                None => match render_module(module, options) {
                    Ok(text) => ModuleOutcome::Generated(text),
                    Err(error) => {
                        tracing::warn!(module = %module.path, %error, "rendering failed");
                        ModuleOutcome::Failed(StubError::Render(error))
                    }
                },
            };
            reports.push(ModuleReport {
                module: module.path.clone(),
                path: module.file.clone(),
                outcome,
            });
        }

        reports.sort_by(|a, b| a.module.cmp(&b.module));
        let report = PackageReport {
            modules: reports,
            diagnostics,
        };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "stub generation finished"
        );
        report
    }
}

//! `pyxstub generate`: write `.pyi` stubs for a package.

use std::path::{Path, PathBuf};

use anyhow::Context;
use pyxstub_engine::stubgen::{create_files, JsonDiagnostic, Severity};
use pyxstub_engine::{ModuleOutcome, PackageReport, SourceFile, StubConfig, StubDiagnostic, StubGenerator};
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::files::{collect_pyx_files, stub_path};
use crate::output::{resolve_color_choice, StyledOutput};
use crate::Format;

pub struct GenerateOptions {
    pub package_dir: PathBuf,
    pub config: Option<PathBuf>,
    pub format: Format,
    pub color: Option<String>,
    pub dry_run: bool,
}

/// Returns `false` when a module could not be generated.
pub fn execute(options: GenerateOptions) -> anyhow::Result<bool> {
    let root = options.package_dir.as_path();
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let config = load_config(root, options.config.as_deref())?;
    let paths = collect_pyx_files(root, &config)?;
    if paths.is_empty() {
        eprintln!("No .pyx files found in {}.", root.display());
        return Ok(true);
    }

    let mut sources = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        match SourceFile::from_path(root, path, text) {
            Some(file) => sources.push(file),
            None => tracing::warn!(path = %path.display(), "not a module of the package"),
        }
    }
    let texts: FxHashMap<String, (PathBuf, String)> = sources
        .iter()
        .filter_map(|f| Some((f.module.clone(), (f.path.clone()?, f.source.clone()))))
        .collect();

    let report = StubGenerator::new(config).generate_package(sources);

    if !options.dry_run {
        write_stubs(&report)?;
    }

    let mut out = StyledOutput::new(resolve_color_choice(options.color.as_deref()));
    match options.format {
        Format::Json => emit_json(&report, &texts, options.dry_run)?,
        Format::Pretty => {
            emit_pretty(&mut out, &report, &texts);
            if options.dry_run {
                print_stubs(&mut out, &report);
            }
            print_summary(&mut out, &report, root);
        }
    }
    out.flush();

    Ok(!report.has_failures())
}

fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<StubConfig> {
    let config = match explicit {
        Some(path) => {
            StubConfig::from_file(path).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => StubConfig::find(root)
            .with_context(|| format!("invalid config in {}", root.display()))?
            .unwrap_or_default(),
    };
    Ok(config)
}

fn write_stubs(report: &PackageReport) -> anyhow::Result<()> {
    for module in &report.modules {
        let (Some(text), Some(path)) = (module.stub(), &module.path) else {
            continue;
        };
        let target = stub_path(path);
        std::fs::write(&target, text).with_context(|| format!("cannot write {}", target.display()))?;
        tracing::debug!(module = %module.module, path = %target.display(), "stub written");
    }
    Ok(())
}

// ── Pretty output (codespan bridge) ────────────────────────────────────────

fn emit_pretty(out: &mut StyledOutput, report: &PackageReport, texts: &FxHashMap<String, (PathBuf, String)>) {
    for diag in report.diagnostics.iter() {
        let (path, source) = match texts.get(&diag.module) {
            Some((path, source)) => (path.display().to_string(), source.as_str()),
            None => (diag.module.clone(), ""),
        };
        let files = create_files(path, source);
        if let Err(error) = diag.emit(out.diagnostics(), &files, 0) {
            tracing::warn!(%error, "cannot render diagnostic");
        }
    }
}

fn print_stubs(out: &mut StyledOutput, report: &PackageReport) {
    for module in &report.modules {
        let Some(text) = module.stub() else {
            continue;
        };
        let target = module
            .path
            .as_deref()
            .map(|p| stub_path(p).display().to_string())
            .unwrap_or_else(|| module.module.clone());
        out.dim(&format!("# ── {} ", target));
        out.newline();
        out.plain(text);
        out.newline();
    }
}

// ── JSON output ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonReport {
    modules: Vec<JsonModule>,
    diagnostics: Vec<JsonDiagnostic>,
}

#[derive(Serialize)]
struct JsonModule {
    module: String,
    path: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stub: Option<String>,
}

fn emit_json(
    report: &PackageReport,
    texts: &FxHashMap<String, (PathBuf, String)>,
    include_stubs: bool,
) -> anyhow::Result<()> {
    let modules = report
        .modules
        .iter()
        .map(|m| {
            let (status, error, stub) = match &m.outcome {
                ModuleOutcome::Generated(text) => ("generated", None, include_stubs.then(|| text.clone())),
                ModuleOutcome::Failed(error) => ("failed", Some(error.to_string()), None),
            };
            JsonModule {
                module: m.module.clone(),
                path: m.path.as_ref().map(|p| stub_path(p).display().to_string()),
                status,
                error,
                stub,
            }
        })
        .collect();
    let diagnostics = report
        .diagnostics
        .iter()
        .map(|d| json_diagnostic(d, texts))
        .collect();

    let json = serde_json::to_string_pretty(&JsonReport { modules, diagnostics })?;
    println!("{}", json);
    Ok(())
}

fn json_diagnostic(diag: &StubDiagnostic, texts: &FxHashMap<String, (PathBuf, String)>) -> JsonDiagnostic {
    let (path, source) = match texts.get(&diag.module) {
        Some((path, source)) => (path.display().to_string(), source.as_str()),
        None => (diag.module.clone(), ""),
    };
    JsonDiagnostic::from_diagnostic(diag, &create_files(path, source), 0)
}

// ── Colored summary ────────────────────────────────────────────────────────

fn print_summary(out: &mut StyledOutput, report: &PackageReport, root: &Path) {
    out.newline();
    for module in &report.modules {
        match &module.outcome {
            ModuleOutcome::Generated(_) => out.ok_badge(),
            ModuleOutcome::Failed(_) => out.fail_badge(),
        }
        out.plain(&format!(" {}", module.module));
        if let Some(path) = &module.path {
            let shown = path.strip_prefix(root).unwrap_or(path);
            out.dim(&format!("  {}", stub_path(shown).display()));
        }
        if let ModuleOutcome::Failed(error) = &module.outcome {
            out.newline();
            out.error(&format!("       {}", error));
        }
        out.newline();
    }

    let count = report.modules.len();
    let warnings = report
        .diagnostics
        .iter()
        .filter(|d| d.severity() == Severity::Warning)
        .count();

    out.newline();
    out.plain(&format!(
        "Generated {} of {} module{}",
        report.succeeded(),
        count,
        if count == 1 { "" } else { "s" }
    ));
    if report.has_failures() {
        out.plain(": ");
        out.error(&format!("{} failed", report.failed()));
    }
    if warnings > 0 {
        out.plain(if report.has_failures() { ", " } else { ": " });
        out.warning(&format!(
            "{} warning{}",
            warnings,
            if warnings == 1 { "" } else { "s" }
        ));
    }
    if !report.has_failures() && warnings == 0 {
        out.plain(" ");
        out.success("without issues");
    }
    out.plain(".");
    out.newline();
}

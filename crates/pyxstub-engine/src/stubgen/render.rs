//! Stub rendering
//!
//! Turns a classified and resolved [`Module`] into `.pyi` text: header,
//! module docstring, imports, then the included declarations in source
//! order.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::parser::ast::ParamKind;
use crate::stubgen::config::StubgenOptions;
use crate::stubgen::error::RenderError;
use crate::stubgen::model::{DeclKind, Declaration, Module, RenderedKind, RenderedParam, ResolvedVia};

/// Version written into the header comment
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

const INDENT: &str = "    ";

pub fn header_line() -> String {
    format!("# This file was generated by pyxstub v{}", GENERATOR_VERSION)
}

/// Render the stub text of `module`.
pub fn render_module(module: &Module, options: &StubgenOptions) -> Result<String, RenderError> {
    check_complete(module)?;

    let mut blocks: Vec<String> = Vec::new();
    if options.header {
        blocks.push(header_line());
    }
    if let Some(doc) = &module.docstring {
        blocks.push(docstring(doc, 0));
    }

    let imports = import_lines(module)?;
    if !imports.is_empty() {
        blocks.push(imports.join("\n"));
    }

    for decl in module.declarations.iter().filter(|d| renders(d)) {
        let mut lines = Vec::new();
        render_declaration(decl, 0, &mut lines);
        blocks.push(lines.join("\n"));
    }

    if blocks.is_empty() {
        return Ok(String::new());
    }
    let mut text = blocks.join("\n\n");
    text.push('\n');
    Ok(text)
}

/// Every declaration must be classified, and every included one resolved.
fn check_complete(module: &Module) -> Result<(), RenderError> {
    let mut error = None;
    module.walk(|decl| {
        if error.is_some() {
            return;
        }
        match decl.decision() {
            None => {
                error = Some(RenderError::Unclassified {
                    module: module.path.clone(),
                    name: decl.qualified_name.clone(),
                })
            }
            Some(decision) if decision.include && decl.resolution().is_none() => {
                error = Some(RenderError::Unresolved {
                    module: module.path.clone(),
                    name: decl.qualified_name.clone(),
                })
            }
            _ => {}
        }
    });
    error.map_or(Ok(()), Err)
}

/// The module's own imports that are re-exported or referenced, in source order,
/// followed by synthesized imports sorted by module.
fn import_lines(module: &Module) -> Result<Vec<String>, RenderError> {
    let mut used: FxHashSet<usize> = FxHashSet::default();
    let mut synthesized: BTreeSet<(String, String)> = BTreeSet::new();
    let mut error = None;

    module.walk(|decl| {
        if !decl.is_included() || error.is_some() {
            return;
        }
        if let Some(index) = decl.import {
            used.insert(index);
        }
        let Some(resolution) = decl.resolution() else {
            return;
        };
        for reference in &resolution.references {
            match (reference.via, &reference.module) {
                (ResolvedVia::Binding(index), _) if index < module.imports.len() => {
                    used.insert(index);
                }
                (ResolvedVia::Builtin | ResolvedVia::Local, _) => {}
                (_, Some(owner)) if reference.needs_synthesized_import() => {
                    if *owner != module.path {
                        synthesized.insert((owner.clone(), reference.name.clone()));
                    }
                }
                _ => {
                    error = Some(RenderError::MissingImport {
                        module: module.path.clone(),
                        name: decl.qualified_name.clone(),
                        reference: reference.name.clone(),
                    })
                }
            }
        }
    });
    if let Some(error) = error {
        return Err(error);
    }

    let mut lines: Vec<String> = Vec::new();
    for (index, binding) in module.imports.iter().enumerate() {
        if !used.contains(&index) {
            continue;
        }
        let line = binding.render();
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    for (owner, name) in synthesized {
        let line = format!("from {} import {}", owner, name);
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Whether a declaration produces text in the declaration section.
fn renders(decl: &Declaration) -> bool {
    decl.is_included() && decl.kind != DeclKind::Import
}

fn render_declaration(decl: &Declaration, level: usize, out: &mut Vec<String>) {
    let (Some(decision), Some(resolution)) = (decl.decision(), decl.resolution()) else {
        return;
    };
    let indent = INDENT.repeat(level);
    let signature = &resolution.signature;

    for decorator in &decision.decorators {
        out.push(format!("{}@{}", indent, decorator.text));
    }

    match decision.rendered_kind {
        RenderedKind::Class => {
            let bases = if signature.bases.is_empty() {
                String::new()
            } else {
                format!("({})", signature.bases.join(", "))
            };
            let members: Vec<&Declaration> = decl.children.iter().filter(|c| renders(c)).collect();
            if members.is_empty() && decl.docstring.is_none() {
                out.push(format!("{}class {}{}: ...", indent, decl.name, bases));
                return;
            }
            out.push(format!("{}class {}{}:", indent, decl.name, bases));
            if let Some(doc) = &decl.docstring {
                out.push(docstring(doc, level + 1));
            }
            for member in members {
                render_declaration(member, level + 1, out);
            }
        }
        RenderedKind::Function => {
            let params: Vec<String> = signature.params.iter().map(render_param).collect();
            let returns = signature
                .type_text
                .as_deref()
                .map(|t| format!(" -> {}", t))
                .unwrap_or_default();
            let prefix = if decl.is_async { "async def" } else { "def" };
            let head = format!("{}{} {}({}){}:", indent, prefix, decl.name, params.join(", "), returns);
            match &decl.docstring {
                Some(doc) => {
                    out.push(head);
                    out.push(docstring(doc, level + 1));
                }
                None => out.push(format!("{} ...", head)),
            }
        }
        RenderedKind::Attribute => {
            let type_text = signature.type_text.as_deref().unwrap_or("object");
            out.push(format!("{}{}: {}", indent, decl.name, type_text));
            if let Some(doc) = &decl.docstring {
                out.push(docstring(doc, level));
            }
        }
        RenderedKind::Import => {}
    }
}

fn render_param(param: &RenderedParam) -> String {
    let name = match param.kind {
        ParamKind::KeywordOnlyMarker => return "*".to_string(),
        ParamKind::PositionalOnlyMarker => return "/".to_string(),
        ParamKind::VarPositional => format!("*{}", param.name),
        ParamKind::VarKeyword => format!("**{}", param.name),
        ParamKind::Regular => param.name.clone(),
    };
    let mut text = match &param.annotation {
        Some(annotation) => format!("{}: {}", name, annotation),
        None => name,
    };
    if param.has_default {
        text.push_str(if param.annotation.is_some() { " = ..." } else { "=..." });
    }
    text
}

/// Triple-quoted docstring at `level`, opening and closing quotes on
/// their own lines.
fn docstring(text: &str, level: usize) -> String {
    let indent = INDENT.repeat(level);
    let escaped = text.replace("\"\"\"", "\\\"\\\"\\\"");
    let mut lines = vec![format!("{}\"\"\"", indent)];
    for line in escaped.lines() {
        if line.is_empty() {
            lines.push(String::new());
        } else {
            lines.push(format!("{}{}", indent, line));
        }
    }
    lines.push(format!("{}\"\"\"", indent));
    lines.join("\n")
}

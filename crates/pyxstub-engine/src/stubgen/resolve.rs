//! Cross-module type resolution
//!
//! Runs after every module of the package has been classified. For each
//! name referenced by an included signature, finds where the stub can
//! import it from:
//!
//! 1. builtins and the module's own included declarations need nothing;
//! 2. a name bound by the module's own imports re-uses that import;
//! 3. a name defined by a module reachable through `cimport`s is imported
//!    from the nearest such module (fewest hops, then lowest path);
//! 4. a name listed in the module's cimport-type overrides is imported
//!    from the override's module;
//! 5. anything else is unresolved: it is reported and replaced by the
//!    opaque type.
//!
//! The opaque type itself is either a builtin or `Any`, which is imported
//! from `typing` unless the module already binds it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::stubgen::diagnostic::{DiagnosticKind, Diagnostics, StubDiagnostic};
use crate::stubgen::graph::{GraphError, ModuleGraph};
use crate::stubgen::model::{Declaration, Module, Package, Resolution, ResolvedVia, TypeReference};
use crate::stubgen::types::{is_builtin, referenced_names, replace_names, root_name};

/// How the opaque type spelled `text` is imported, or `None` when `text`
/// cannot stand for an unknown type.
pub fn opaque_reference(text: &str) -> Option<TypeReference> {
    if is_builtin(text) {
        Some(TypeReference::new(text, None, ResolvedVia::Builtin))
    } else if text == "Any" {
        Some(TypeReference::new(text, Some("typing".to_string()), ResolvedVia::Canonical))
    } else {
        None
    }
}

pub struct Resolver<'p> {
    package: &'p Package,
    graph: &'p ModuleGraph,
    opaque: &'p str,
}

impl<'p> Resolver<'p> {
    pub fn new(package: &'p Package, graph: &'p ModuleGraph, opaque: &'p str) -> Self {
        Self {
            package,
            graph,
            opaque,
        }
    }

    /// Resolve every module of the package.
    pub fn resolve_package(&self, diagnostics: &mut Diagnostics) -> Result<(), GraphError> {
        for module in &self.package.modules {
            self.resolve_module(module, diagnostics)?;
        }
        Ok(())
    }

    /// Resolve the included declarations of one module.
    pub fn resolve_module(&self, module: &Module, diagnostics: &mut Diagnostics) -> Result<(), GraphError> {
        let reachable = self.graph.reachable(&module.path)?;
        let mut cache: FxHashMap<String, TypeReference> = FxHashMap::default();
        let mut unresolved_total = 0usize;

        module.walk(|decl| {
            if !decl.is_included() || decl.resolution().is_some() {
                return;
            }
            unresolved_total += self.resolve_declaration(module, &reachable, &mut cache, decl, diagnostics);
        });

        tracing::debug!(
            module = %module.path,
            reachable = reachable.len(),
            unresolved = unresolved_total,
            "resolved module"
        );
        Ok(())
    }

    fn resolve_declaration(
        &self,
        module: &Module,
        reachable: &[(String, usize)],
        cache: &mut FxHashMap<String, TypeReference>,
        decl: &Declaration,
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let Some(decision) = decl.decision() else {
            return 0;
        };

        let mut names: Vec<String> = Vec::new();
        for text in decision.signature.texts() {
            names.extend(referenced_names(text));
        }
        for decorator in decision.decorators.iter().filter(|d| d.canonical_import.is_none()) {
            names.extend(referenced_names(&decorator.text));
        }

        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut references = Vec::new();
        let mut unresolved: FxHashSet<String> = FxHashSet::default();
        for chain in names {
            if !seen.insert(chain.clone()) {
                continue;
            }
            let reference = cache
                .entry(chain.clone())
                .or_insert_with(|| self.lookup(module, reachable, &chain))
                .clone();
            if reference.via == ResolvedVia::Unresolved {
                let name = root_name(&chain).to_string();
                if unresolved.contains(&name) {
                    continue;
                }
                diagnostics.push(
                    StubDiagnostic::new(
                        DiagnosticKind::UnresolvedTypeReference,
                        &module.path,
                        format!("Cannot resolve type '{}'; using '{}' instead", name, self.opaque),
                    )
                    .with_name(&decl.qualified_name)
                    .with_span(decl.span, "referenced here")
                    .with_help(format!(
                        "import '{}', or list it under cimport-types for module '{}'",
                        name, module.path
                    )),
                );
                unresolved.insert(name);
            } else {
                references.push(reference);
            }
        }

        for decorator in &decision.decorators {
            if let Some((owner, name)) = &decorator.canonical_import {
                references.push(TypeReference::new(name.clone(), Some(owner.clone()), ResolvedVia::Canonical));
            }
        }

        let signature = if unresolved.is_empty() {
            decision.signature.clone()
        } else {
            decision
                .signature
                .map_texts(|text| replace_names(text, |root| unresolved.contains(root), self.opaque))
        };

        if !unresolved.is_empty() && seen.insert(self.opaque.to_string()) {
            let reference = cache
                .entry(self.opaque.to_string())
                .or_insert_with(|| self.lookup(module, reachable, self.opaque))
                .clone();
            if reference.via != ResolvedVia::Unresolved {
                references.push(reference);
            }
        }

        let count = unresolved.len();
        if decl.resolve(Resolution { signature, references }).is_err() {
            tracing::trace!(name = %decl.qualified_name, "declaration already resolved");
        }
        count
    }

    /// Where the dotted `reference`, used in `module`, can be imported from.
    /// The returned name is the reference's root.
    pub fn lookup(&self, module: &Module, reachable: &[(String, usize)], reference: &str) -> TypeReference {
        let name = root_name(reference);
        if is_builtin(name) {
            return TypeReference::new(name, None, ResolvedVia::Builtin);
        }
        if module
            .declarations
            .iter()
            .any(|d| d.name == name && d.is_included())
        {
            return TypeReference::new(name, None, ResolvedVia::Local);
        }
        if let Some((index, binding)) = module.binding_for(reference) {
            return TypeReference::new(name, Some(binding.module.clone()), ResolvedVia::Binding(index));
        }
        if name == self.opaque {
            if let Some(reference) = opaque_reference(name) {
                return reference;
            }
        }
        for (path, hops) in reachable {
            if self.package.get(path).is_some_and(|other| other.defines(name)) {
                return TypeReference::new(name, Some(path.clone()), ResolvedVia::ImportChain { hops: *hops });
            }
        }
        if let Some(reference) = module.explicit_cimport_types.iter().find(|r| r.name == name) {
            return reference.clone();
        }
        TypeReference::new(name, None, ResolvedVia::Unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::stubgen::classify::classify_module;
    use crate::stubgen::config::StubgenOptions;
    use crate::stubgen::extract::extract_module;

    fn package(sources: &[(&str, &str)]) -> Package {
        let modules = sources
            .iter()
            .map(|(path, source)| {
                let tree = parse_module(source).unwrap();
                extract_module(*path, *source, false, &tree)
            })
            .collect();
        let package = Package::new(modules);
        let mut diagnostics = Diagnostics::new();
        for module in &package.modules {
            classify_module(module, &StubgenOptions::default(), &mut diagnostics);
        }
        package
    }

    fn resolve(package: &Package) -> Diagnostics {
        let graph = ModuleGraph::from_package(package);
        let mut diagnostics = Diagnostics::new();
        Resolver::new(package, &graph, "object")
            .resolve_package(&mut diagnostics)
            .unwrap();
        diagnostics
    }

    fn references(package: &Package, module: &str, name: &str) -> Vec<TypeReference> {
        package
            .get(module)
            .and_then(|m| m.find_qualified(name))
            .and_then(|d| d.resolution())
            .map(|r| r.references.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_leaked_type_is_found_through_cimports() {
        let package = package(&[
            ("pkg.a", "class T:\n    pass\n"),
            ("pkg.b", "from pkg.a cimport T\n"),
            ("pkg.c", "from pkg cimport b\ndef f(x: T) -> int: pass\n"),
        ]);
        let diagnostics = resolve(&package);
        assert!(diagnostics.is_empty());

        let refs = references(&package, "pkg.c", "f");
        let t = refs.iter().find(|r| r.name == "T").unwrap();
        assert_eq!(t.module.as_deref(), Some("pkg.a"));
        assert_eq!(t.via, ResolvedVia::ImportChain { hops: 2 });
    }

    #[test]
    fn test_fewest_hops_then_lowest_path() {
        let package = package(&[
            ("pkg.x", "class T: pass\n"),
            ("pkg.y", "class T: pass\n"),
            ("pkg.z", "cimport pkg.y\ncimport pkg.x\nclass T2: pass\n"),
            ("pkg.m", "cimport pkg.z\ncimport pkg.y\ndef f() -> T: pass\n"),
        ]);
        resolve(&package);
        let refs = references(&package, "pkg.m", "f");
        assert_eq!(refs[0].module.as_deref(), Some("pkg.y"));
        assert_eq!(refs[0].via, ResolvedVia::ImportChain { hops: 1 });
    }

    #[test]
    fn test_own_binding_wins() {
        let package = package(&[
            ("pkg.a", "class T: pass\n"),
            ("pkg.m", "from other import T\ncimport pkg.a\ndef f() -> T: pass\n"),
        ]);
        resolve(&package);
        let refs = references(&package, "pkg.m", "f");
        assert_eq!(refs[0].via, ResolvedVia::Binding(0));
        assert_eq!(refs[0].module.as_deref(), Some("other"));
    }

    #[test]
    fn test_override_and_unresolved() {
        let mut modules = vec![{
            let source = "def f(a: Known, b: list[Missing]) -> None: pass\n";
            let tree = parse_module(source).unwrap();
            extract_module("pkg.m", source, false, &tree)
        }];
        modules[0]
            .explicit_cimport_types
            .push(TypeReference::new("Known", Some("pkg.types".to_string()), ResolvedVia::Override));
        let package = Package::new(modules);
        let mut diagnostics = Diagnostics::new();
        classify_module(&package.modules[0], &StubgenOptions::default(), &mut diagnostics);
        let diagnostics = resolve(&package);

        let decl = package.modules[0].find_qualified("f").unwrap();
        let resolution = decl.resolution().unwrap();
        assert_eq!(resolution.signature.params[1].annotation.as_deref(), Some("list[object]"));
        assert_eq!(resolution.signature.params[0].annotation.as_deref(), Some("Known"));
        assert!(resolution
            .references
            .iter()
            .any(|r| r.name == "Known" && r.via == ResolvedVia::Override));

        let warnings: Vec<_> = diagnostics.iter().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, DiagnosticKind::UnresolvedTypeReference);
        assert!(warnings[0].message.contains("Missing"));
    }

    #[test]
    fn test_excluded_types_are_not_importable() {
        let package = package(&[("m", "cdef class Pub:\n    pass\ncdef struct S:\n    int a\ndef f(x: S) -> Pub: pass\n")]);
        let diagnostics = resolve(&package);
        let resolution = package.modules[0].find_qualified("f").and_then(|d| d.resolution()).unwrap();
        assert_eq!(resolution.signature.type_text.as_deref(), Some("Pub"));
        assert_eq!(resolution.signature.params[0].annotation.as_deref(), Some("object"));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_any_opaque_is_imported_from_typing() {
        let package = package(&[("m", "def f(a: Missing) -> None: pass\n")]);
        let graph = ModuleGraph::from_package(&package);
        let mut diagnostics = Diagnostics::new();
        Resolver::new(&package, &graph, "Any")
            .resolve_package(&mut diagnostics)
            .unwrap();

        let resolution = package.modules[0].find_qualified("f").and_then(|d| d.resolution()).unwrap();
        assert_eq!(resolution.signature.params[0].annotation.as_deref(), Some("Any"));
        let any = resolution.references.iter().find(|r| r.name == "Any").unwrap();
        assert_eq!(any.module.as_deref(), Some("typing"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.iter().all(|d| d.message.contains("Missing")));
    }

    #[test]
    fn test_opaque_reference() {
        assert_eq!(opaque_reference("object").map(|r| r.via), Some(ResolvedVia::Builtin));
        assert_eq!(
            opaque_reference("Any").and_then(|r| r.module),
            Some("typing".to_string())
        );
        assert_eq!(opaque_reference("Unknown"), None);
    }
}

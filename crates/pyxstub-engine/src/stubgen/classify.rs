//! Visibility classification
//!
//! Decides for every declaration whether it belongs in the stub and, if
//! so, in what rendered form. The verdict is written once into the
//! declaration's [`Decision`] slot.

use crate::parser::ast::ParamKind;
use crate::parser::token::Span;
use crate::stubgen::config::StubgenOptions;
use crate::stubgen::decorators::DecoratorClass;
use crate::stubgen::diagnostic::{DiagnosticKind, Diagnostics, StubDiagnostic};
use crate::stubgen::model::{
    AccessorRole, DeclKind, Declaration, Decision, Exclusion, Module, Parameter,
    RenderedDecorator, RenderedKind, RenderedParam, Signature,
};
use crate::stubgen::types::{is_dunder, translate_annotation, translate_native_type};

/// Names that never appear in a stub, at module or class level.
const DISALLOWED_NAMES: &[&str] = &[
    "__all__",
    "__cimport_types__",
    "__class__",
    "__dir__",
    "__doc__",
    "__file__",
    "__format__",
    "__getstate__",
    "__hash__",
    "__init_subclass__",
    "__loader__",
    "__name__",
    "__new__",
    "__package__",
    "__pyx_capi__",
    "__reduce__",
    "__reduce_ex__",
    "__setstate__",
    "__sizeof__",
    "__spec__",
    "__subclasshook__",
    "__test__",
    "__weakref__",
];

pub fn is_disallowed_name(name: &str) -> bool {
    name.starts_with("__pyx_") || DISALLOWED_NAMES.contains(&name)
}

/// Classify every declaration of `module`.
pub fn classify_module(module: &Module, options: &StubgenOptions, diagnostics: &mut Diagnostics) {
    let mut classifier = Classifier {
        module,
        options,
        diagnostics,
    };
    classifier.check_override_targets();
    for decl in &module.declarations {
        classifier.classify(decl, None, true);
    }

    let mut included = 0usize;
    module.walk(|d| included += usize::from(d.is_included()));
    tracing::debug!(module = %module.path, included, "classified module");
}

struct Classifier<'a> {
    module: &'a Module,
    options: &'a StubgenOptions,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Classifier<'a> {
    fn record(&self, decl: &Declaration, decision: Decision) {
        if decl.decide(decision).is_err() {
            tracing::trace!(name = %decl.qualified_name, "declaration already classified");
        }
    }

    fn exclude_tree(&self, decl: &Declaration, reason: Exclusion) {
        self.record(decl, Decision::excluded(rendered_kind(decl.kind), reason));
        for child in &decl.children {
            self.exclude_tree(child, Exclusion::Parent);
        }
    }

    fn classify(&mut self, decl: &Declaration, parent: Option<&Declaration>, parent_included: bool) {
        if !parent_included {
            return self.exclude_tree(decl, Exclusion::Parent);
        }
        if let Some(reason) = self.exclusion(decl, parent) {
            return self.exclude_tree(decl, reason);
        }

        match decl.kind {
            DeclKind::Class => {
                let signature = Signature {
                    bases: decl.bases.iter().map(|b| translate_annotation(b)).collect(),
                    ..Signature::default()
                };
                let mut decision = Decision::included(RenderedKind::Class, signature);
                decision.decorators = self.decorators(decl);
                self.record(decl, decision);
                for child in &decl.children {
                    self.classify(child, Some(decl), true);
                }
            }
            DeclKind::Function | DeclKind::Method => {
                if let Some(accessor) = &decl.accessor {
                    // decorated property getter; setters and deleters were excluded
                    let class = parent.map(|p| p.qualified_name.as_str()).unwrap_or_default();
                    let type_text = self.property_type(class, &accessor.property, &decl.qualified_name);
                    self.record(decl, attribute(type_text));
                } else {
                    let signature = Signature {
                        type_text: Some(self.return_type(decl)),
                        params: self.params(decl),
                        bases: Vec::new(),
                    };
                    let mut decision = Decision::included(RenderedKind::Function, signature);
                    decision.decorators = self.decorators(decl);
                    self.record(decl, decision);
                }
                for child in &decl.children {
                    self.classify(child, Some(decl), false);
                }
            }
            DeclKind::Property => {
                let class = parent.map(|p| p.qualified_name.as_str()).unwrap_or_default();
                let type_text = self.property_type(class, &decl.name, &decl.qualified_name);
                self.record(decl, attribute(type_text));
                for child in &decl.children {
                    self.exclude_tree(child, Exclusion::PropertyAccessor);
                }
            }
            DeclKind::Attribute => {
                let type_text = self.value_type(decl);
                self.record(decl, attribute(type_text));
            }
            DeclKind::Import => {
                self.record(decl, Decision::included(RenderedKind::Import, Signature::default()));
            }
            DeclKind::Module | DeclKind::Opaque => {
                self.exclude_tree(decl, Exclusion::Unsupported);
            }
        }
    }

    fn exclusion(&mut self, decl: &Declaration, parent: Option<&Declaration>) -> Option<Exclusion> {
        if !decl.visibility.is_visible() {
            return Some(Exclusion::ImplementationOnly);
        }
        if decl.kind == DeclKind::Opaque {
            self.report_unsupported(decl);
            return Some(Exclusion::Unsupported);
        }
        if is_disallowed_name(&decl.name) {
            return Some(Exclusion::DisallowedName);
        }
        let callable = matches!(decl.kind, DeclKind::Function | DeclKind::Method);
        if callable && is_dunder(&decl.name) && !self.options.allowed_dunders.contains(&decl.name) {
            return Some(Exclusion::PrivateDunder);
        }
        if let Some(accessor) = &decl.accessor {
            if accessor.role != AccessorRole::Getter {
                return Some(Exclusion::PropertyAccessor);
            }
            // a second getter for the same property
            let class = parent.map(|p| p.qualified_name.clone()).unwrap_or_default();
            let link = self.module.property_links.get(&(class, accessor.property.clone()));
            if link.and_then(|l| l.getter) != Some(decl.source_order) {
                return Some(Exclusion::PropertyAccessor);
            }
        }
        None
    }

    fn report_unsupported(&mut self, decl: &Declaration) {
        let text = decl.opaque_text.as_deref().unwrap_or_default();
        let mut diag = StubDiagnostic::new(
            DiagnosticKind::UnsupportedConstruct,
            &self.module.path,
            format!("Unsupported construct `{}` is left out of the stub", text),
        )
        .with_name(&decl.qualified_name)
        .with_span(decl.span, "not a recognized declaration");
        if let Some(reason) = &decl.opaque_reason {
            diag = diag.with_note(reason.clone());
        }
        self.diagnostics.push(diag);
    }

    /// Every override key must name a declaration or a parameter.
    fn check_override_targets(&mut self) {
        let module = self.module;
        let mut keys: Vec<&String> = module.explicit_annotation_overrides.keys().collect();
        keys.sort();
        for key in keys {
            match module.find_qualified(key) {
                Some(decl) if decl.kind == DeclKind::Class => {
                    self.diagnostics.push(
                        StubDiagnostic::new(
                            DiagnosticKind::ConflictingOverride,
                            &self.module.path,
                            format!("Annotation override for class '{}' is ignored", key),
                        )
                        .with_name(key.as_str())
                        .with_span(decl.span, "a class has no annotation"),
                    );
                }
                Some(_) => {}
                None => {
                    let names_parameter = key
                        .rsplit_once('.')
                        .and_then(|(owner, param)| {
                            module
                                .find_qualified(owner)
                                .map(|d| d.params.iter().any(|p| p.name == param))
                        })
                        .unwrap_or(false);
                    if !names_parameter {
                        self.diagnostics.push(
                            StubDiagnostic::new(
                                DiagnosticKind::UnknownOverrideTarget,
                                &self.module.path,
                                format!("Annotation override '{}' names no declaration", key),
                            )
                            .with_name(key.as_str()),
                        );
                    }
                }
            }
        }
    }

    /// The override for `key`, reporting a conflict with a differing
    /// explicit annotation.
    fn take_override(&mut self, key: &str, explicit: Option<&str>, span: Span) -> Option<String> {
        let module = self.module;
        let text = module.explicit_annotation_overrides.get(key)?;
        if let Some(explicit) = explicit {
            if explicit.trim() != text {
                self.diagnostics.push(
                    StubDiagnostic::new(
                        DiagnosticKind::ConflictingOverride,
                        &self.module.path,
                        format!(
                            "Annotation override '{}' replaces the declared type '{}'",
                            text, explicit
                        ),
                    )
                    .with_name(key)
                    .with_span(span, "declared here"),
                );
            }
        }
        Some(text.clone())
    }

    fn native_or_opaque(&self, native: Option<&str>) -> String {
        if self.options.translate_native_types {
            if let Some(text) = native.and_then(translate_native_type) {
                return text;
            }
        }
        self.options.opaque_type.clone()
    }

    fn return_type(&mut self, decl: &Declaration) -> String {
        if let Some(text) = self.take_override(&decl.qualified_name, decl.annotation.as_deref(), decl.span) {
            return text;
        }
        if let Some(annotation) = &decl.annotation {
            return translate_annotation(annotation);
        }
        if decl.name == "__init__" {
            return "None".to_string();
        }
        self.native_or_opaque(decl.native_type.as_deref())
    }

    fn value_type(&mut self, decl: &Declaration) -> String {
        if let Some(text) = self.take_override(&decl.qualified_name, decl.annotation.as_deref(), decl.span) {
            return text;
        }
        if let Some(annotation) = &decl.annotation {
            return translate_annotation(annotation);
        }
        self.native_or_opaque(decl.native_type.as_deref())
    }

    /// Attribute type of a property: the getter's type, or the setter's
    /// value type when the getter has none.
    fn property_type(&mut self, class: &str, property: &str, qualified: &str) -> String {
        let module = self.module;
        let link = module
            .property_links
            .get(&(class.to_string(), property.to_string()))
            .copied()
            .unwrap_or_default();
        let getter = link.getter.and_then(|order| module.find(order));
        let setter = link.setter.and_then(|order| module.find(order));

        let declared = getter.and_then(|g| g.annotation.as_deref());
        let span = getter.map(|g| g.span).unwrap_or(Span::new(0, 0, 0, 0));
        if let Some(text) = self.take_override(qualified, declared, span) {
            return text;
        }
        if let Some(annotation) = declared {
            return translate_annotation(annotation);
        }
        if self.options.translate_native_types {
            if let Some(text) = getter
                .and_then(|g| g.native_type.as_deref())
                .and_then(translate_native_type)
            {
                return text;
            }
        }
        let setter_value = setter.and_then(|s| {
            s.params
                .iter()
                .filter(|p| p.kind == ParamKind::Regular)
                .nth(1)
                .and_then(|p| p.annotation.as_deref())
        });
        match setter_value {
            Some(annotation) => translate_annotation(annotation),
            None => self.options.opaque_type.clone(),
        }
    }

    fn params(&mut self, decl: &Declaration) -> Vec<RenderedParam> {
        let binds_receiver = decl.kind == DeclKind::Method
            && !decl
                .decorators
                .iter()
                .any(|d| DecoratorClass::recognize(&d.name) == DecoratorClass::StaticMethod);

        decl.params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let receiver = binds_receiver && i == 0 && param.kind == ParamKind::Regular;
                RenderedParam {
                    name: param.name.clone(),
                    kind: param.kind,
                    annotation: self.param_annotation(decl, param, receiver),
                    has_default: param.has_default,
                }
            })
            .collect()
    }

    fn param_annotation(&mut self, decl: &Declaration, param: &Parameter, receiver: bool) -> Option<String> {
        if receiver
            || matches!(
                param.kind,
                ParamKind::KeywordOnlyMarker | ParamKind::PositionalOnlyMarker
            )
        {
            return None;
        }
        let key = format!("{}.{}", decl.qualified_name, param.name);
        if let Some(text) = self.take_override(&key, param.annotation.as_deref(), decl.span) {
            return Some(text);
        }
        if let Some(annotation) = &param.annotation {
            return Some(translate_annotation(annotation));
        }
        if !decl.native {
            return None;
        }
        Some(self.native_or_opaque(param.native_type.as_deref()))
    }

    /// Preserved decorators in rendered form; unknown ones are reported.
    fn decorators(&mut self, decl: &Declaration) -> Vec<RenderedDecorator> {
        let mut rendered = Vec::new();
        for decorator in &decl.decorators {
            let class = DecoratorClass::recognize(&decorator.name);
            if let Some(canonical) = class.canonical() {
                let args = decorator.args.as_deref().unwrap_or_default();
                let bound = self
                    .module
                    .binding_for(&decorator.name)
                    .is_some_and(|(_, b)| b.module != "cython" && !b.module.starts_with("cython."));
                rendered.push(if bound || canonical.module.is_none() {
                    let name = if bound { decorator.name.as_str() } else { canonical.name };
                    RenderedDecorator {
                        text: format!("{}{}", name, args),
                        canonical_import: None,
                    }
                } else {
                    RenderedDecorator {
                        text: format!("{}{}", canonical.name, args),
                        canonical_import: canonical
                            .module
                            .map(|m| (m.to_string(), canonical.name.to_string())),
                    }
                });
                continue;
            }
            if class == DecoratorClass::Unknown {
                self.diagnostics.push(
                    StubDiagnostic::new(
                        DiagnosticKind::DroppedDecorator,
                        &self.module.path,
                        format!("Decorator '@{}' is not part of the stub", decorator.name),
                    )
                    .with_name(&decl.qualified_name)
                    .with_span(decorator.span, "dropped"),
                );
            }
        }
        rendered
    }
}

fn attribute(type_text: String) -> Decision {
    Decision::included(
        RenderedKind::Attribute,
        Signature {
            type_text: Some(type_text),
            ..Signature::default()
        },
    )
}

fn rendered_kind(kind: DeclKind) -> RenderedKind {
    match kind {
        DeclKind::Class => RenderedKind::Class,
        DeclKind::Function | DeclKind::Method => RenderedKind::Function,
        DeclKind::Import => RenderedKind::Import,
        DeclKind::Module
        | DeclKind::Attribute
        | DeclKind::Property
        | DeclKind::Opaque => RenderedKind::Attribute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::stubgen::extract::extract_module;

    fn classify(source: &str, options: &StubgenOptions) -> (Module, Diagnostics) {
        let tree = parse_module(source).unwrap();
        let module = extract_module("m", source, false, &tree);
        let mut diagnostics = Diagnostics::new();
        classify_module(&module, options, &mut diagnostics);
        (module, diagnostics)
    }

    fn decision<'m>(module: &'m Module, name: &str) -> &'m Decision {
        module.find_qualified(name).and_then(|d| d.decision()).unwrap()
    }

    #[test]
    fn test_native_visibility() {
        let (module, _) = classify(
            "cpdef int f(int x): return x\ncdef int g(): return 1\ndef h(a, b=1): pass\n",
            &StubgenOptions::default(),
        );
        let f = decision(&module, "f");
        assert!(f.include);
        assert_eq!(f.signature.type_text.as_deref(), Some("object"));
        assert_eq!(f.signature.params[0].annotation.as_deref(), Some("object"));

        let g = decision(&module, "g");
        assert_eq!(g.exclusion, Some(Exclusion::ImplementationOnly));

        let h = decision(&module, "h");
        assert_eq!(h.signature.params[0].annotation, None);
        assert!(h.signature.params[1].has_default);
    }

    #[test]
    fn test_translate_native_types_option() {
        let options = StubgenOptions {
            translate_native_types: true,
            ..StubgenOptions::default()
        };
        let (module, _) = classify("cpdef double f(bint flag, char *name): pass\n", &options);
        let f = decision(&module, "f");
        assert_eq!(f.signature.type_text.as_deref(), Some("float"));
        assert_eq!(f.signature.params[0].annotation.as_deref(), Some("bool"));
        assert_eq!(f.signature.params[1].annotation.as_deref(), Some("object"));
    }

    #[test]
    fn test_override_precedence() {
        let source = "cpdef f(x): pass\ndef g() -> str: pass\n";
        let tree = parse_module(source).unwrap();
        let mut module = extract_module("m", source, false, &tree);
        module
            .explicit_annotation_overrides
            .insert("f".to_string(), "int".to_string());
        module
            .explicit_annotation_overrides
            .insert("f.x".to_string(), "list[int]".to_string());
        module
            .explicit_annotation_overrides
            .insert("g".to_string(), "bytes".to_string());
        module
            .explicit_annotation_overrides
            .insert("nothing".to_string(), "int".to_string());
        let mut diagnostics = Diagnostics::new();
        classify_module(&module, &StubgenOptions::default(), &mut diagnostics);

        let f = decision(&module, "f");
        assert_eq!(f.signature.type_text.as_deref(), Some("int"));
        assert_eq!(f.signature.params[0].annotation.as_deref(), Some("list[int]"));
        assert_eq!(decision(&module, "g").signature.type_text.as_deref(), Some("bytes"));

        let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::ConflictingOverride));
        assert!(kinds.contains(&DiagnosticKind::UnknownOverrideTarget));
    }

    #[test]
    fn test_property_collapse() {
        let source = "class A:\n    @property\n    def x(self) -> int:\n        return 1\n    @x.setter\n    def x(self, v: float):\n        pass\n";
        let (module, _) = classify(source, &StubgenOptions::default());
        let class = &module.declarations[0];
        let getter = class.children[0].decision().unwrap();
        assert_eq!(getter.rendered_kind, RenderedKind::Attribute);
        assert_eq!(getter.signature.type_text.as_deref(), Some("int"));
        let setter = class.children[1].decision().unwrap();
        assert_eq!(setter.exclusion, Some(Exclusion::PropertyAccessor));
    }

    #[test]
    fn test_setter_type_used_when_getter_untyped() {
        let source = "cdef class A:\n    property size:\n        def __get__(self):\n            return 1\n        def __set__(self, value: int):\n            pass\n";
        let (module, _) = classify(source, &StubgenOptions::default());
        let prop = decision(&module, "A.size");
        assert_eq!(prop.rendered_kind, RenderedKind::Attribute);
        assert_eq!(prop.signature.type_text.as_deref(), Some("int"));
        assert_eq!(
            decision(&module, "A.size.__get__").exclusion,
            Some(Exclusion::PropertyAccessor)
        );
    }

    #[test]
    fn test_names_and_dunders() {
        let source = "__all__ = ['f']\n__pyx_x = 1\nclass A:\n    def __init__(self): pass\n    def __cinit__(self): pass\n    def __len__(self) -> int: return 0\n    def __repr__(self): pass\n";
        let (module, _) = classify(source, &StubgenOptions::default());
        assert_eq!(decision(&module, "__all__").exclusion, Some(Exclusion::DisallowedName));
        assert_eq!(decision(&module, "__pyx_x").exclusion, Some(Exclusion::DisallowedName));
        let init = decision(&module, "A.__init__");
        assert!(init.include);
        assert_eq!(init.signature.type_text.as_deref(), Some("None"));
        assert_eq!(init.signature.params[0].annotation, None);
        assert_eq!(decision(&module, "A.__cinit__").exclusion, Some(Exclusion::PrivateDunder));
        assert!(decision(&module, "A.__len__").include);
        assert_eq!(decision(&module, "A.__repr__").exclusion, Some(Exclusion::PrivateDunder));
    }

    #[test]
    fn test_excluded_parent_excludes_children() {
        let source = "cdef struct S:\n    int a\nclass __weakref__:\n    def f(self): pass\n";
        let (module, _) = classify(source, &StubgenOptions::default());
        assert_eq!(decision(&module, "__weakref__.f").exclusion, Some(Exclusion::Parent));
    }

    #[test]
    fn test_unsupported_construct_reported() {
        let (module, diagnostics) = classify("if X:\n    pass\n", &StubgenOptions::default());
        assert!(!module.declarations[0].is_included());
        let diag = diagnostics.iter().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::UnsupportedConstruct);
        assert!(diag.message.contains("if X:"));
    }

    #[test]
    fn test_decorators() {
        let source = "import dataclasses\n@dataclasses.dataclass(frozen=True)\nclass P:\n    x: int\n@dataclass\nclass Q:\n    pass\n@staticmethod\ndef s(): pass\n@app.route('/')\n@cython.boundscheck(False)\ndef r(): pass\n";
        let (module, diagnostics) = classify(source, &StubgenOptions::default());

        let p = decision(&module, "P");
        assert_eq!(p.decorators[0].text, "dataclasses.dataclass(frozen=True)");
        assert_eq!(p.decorators[0].canonical_import, None);

        let q = decision(&module, "Q");
        assert_eq!(q.decorators[0].text, "dataclass");
        assert_eq!(
            q.decorators[0].canonical_import,
            Some(("dataclasses".to_string(), "dataclass".to_string()))
        );

        assert_eq!(decision(&module, "s").decorators[0].text, "staticmethod");
        assert!(decision(&module, "r").decorators.is_empty());

        let dropped: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::DroppedDecorator)
            .collect();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].qualified_name.as_deref(), Some("r"));
    }

    #[test]
    fn test_receiver_is_never_annotated() {
        let source = "cdef class A:\n    @staticmethod\n    def make(int n): pass\n    cpdef run(self, int n): pass\n";
        let (module, _) = classify(source, &StubgenOptions::default());
        let make = decision(&module, "A.make");
        assert_eq!(make.signature.params[0].annotation, None);
        let run = decision(&module, "A.run");
        assert_eq!(run.signature.params[0].annotation, None);
        assert_eq!(run.signature.params[1].annotation.as_deref(), Some("object"));
    }

    #[test]
    fn test_classification_is_write_once() {
        let (module, mut diagnostics) = classify("cpdef f(): pass\n", &StubgenOptions::default());
        let options = StubgenOptions {
            opaque_type: "Any".to_string(),
            ..StubgenOptions::default()
        };
        classify_module(&module, &options, &mut diagnostics);
        assert_eq!(decision(&module, "f").signature.type_text.as_deref(), Some("object"));
    }
}

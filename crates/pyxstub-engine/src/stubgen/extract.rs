//! Declaration extraction
//!
//! Walks a parsed [`SourceModule`] and builds the [`Module`] model:
//! one [`Declaration`] per class, function, attribute, property and
//! re-exported import, numbered in source order, plus the module's import
//! bindings and the getter/setter links of its properties.

use crate::parser::ast::{
    ClassDef, DefKind, EnumDef, FunctionDef, ImportName, ImportStmt, NativeDecl, NativeKind,
    PropertyBlock, SourceModule, Stmt, Unsupported, VariableDecl,
};
use crate::parser::token::Span;
use crate::stubgen::decorators::DecoratorClass;
use crate::stubgen::model::{
    Accessor, AccessorRole, DeclKind, Declaration, DecoratorRef, ImportBinding, Module,
    NativeVisibility, Parameter, ResolvedVia, TypeReference,
};
use crate::stubgen::types::clean_docstring;

/// Module attribute that lists types the stub may reference without an import
pub const CIMPORT_TYPES_ATTRIBUTE: &str = "__cimport_types__";

/// Extract the declaration model of one parsed module.
pub fn extract_module(
    path: impl Into<String>,
    source: impl Into<String>,
    is_package: bool,
    tree: &SourceModule,
) -> Module {
    Extractor::new(path, source, is_package).extract(tree)
}

pub struct Extractor {
    module: Module,
    next_order: u32,
    cimport_types: Option<String>,
}

impl Extractor {
    pub fn new(path: impl Into<String>, source: impl Into<String>, is_package: bool) -> Self {
        let mut module = Module::new(path, source);
        module.is_package = is_package;
        Self {
            module,
            next_order: 0,
            cimport_types: None,
        }
    }

    pub fn extract(mut self, tree: &SourceModule) -> Module {
        let mut body = tree.body.as_slice();
        if let Some(Stmt::Docstring(doc)) = body.first() {
            self.module.docstring = clean_docstring(&doc.value);
            body = &body[1..];
        }

        self.module.declarations = self.extract_body(body, None);

        if let Some(text) = self.cimport_types.take() {
            self.apply_cimport_types(&text);
        }
        tracing::trace!(
            module = %self.module.path,
            declarations = self.next_order,
            imports = self.module.imports.len(),
            "extracted module"
        );
        self.module
    }

    fn extract_body(&mut self, body: &[Stmt], parent: Option<&str>) -> Vec<Declaration> {
        let mut decls = Vec::new();
        // Index of the attribute a following string statement documents
        let mut doc_target: Option<usize> = None;

        for stmt in body {
            let mut next_target = None;
            match stmt {
                Stmt::Function(func) => decls.push(self.function(func, parent)),
                Stmt::Class(class) => decls.push(self.class(class, parent)),
                Stmt::Variable(var) => {
                    decls.push(self.variable(var, parent));
                    next_target = Some(decls.len() - 1);
                }
                Stmt::Import(import) => decls.extend(self.import(import, parent)),
                Stmt::Property(block) => decls.push(self.property_block(block, parent)),
                Stmt::Enum(def) => decls.push(self.enumeration(def, parent)),
                Stmt::Docstring(doc) => {
                    if let Some(decl) = doc_target.and_then(|i| decls.get_mut(i)) {
                        if decl.docstring.is_none() {
                            decl.docstring = clean_docstring(&doc.value);
                        }
                    }
                }
                Stmt::Pass(_) => {}
                Stmt::Native(native) => decls.push(self.native(native, parent)),
                Stmt::Unsupported(unsupported) => decls.push(self.unsupported(unsupported, parent)),
            }
            doc_target = next_target;
        }

        decls
    }

    fn declare(&mut self, kind: DeclKind, name: &str, parent: Option<&str>, span: Span) -> Declaration {
        let qualified = match parent {
            Some(parent) => format!("{}.{}", parent, name),
            None => name.to_string(),
        };
        let mut decl = Declaration::new(kind, name, qualified);
        decl.source_order = self.next_order;
        decl.span = span;
        self.next_order += 1;
        decl
    }

    fn function(&mut self, func: &FunctionDef, parent: Option<&str>) -> Declaration {
        let kind = if parent.is_some() {
            DeclKind::Method
        } else {
            DeclKind::Function
        };
        let mut decl = self.declare(kind, &func.name, parent, func.span);
        decl.native = func.kind != DefKind::Python;
        decl.visibility = match func.kind {
            DefKind::Cdef => NativeVisibility::ImplementationOnly,
            DefKind::Cpdef | DefKind::Python => NativeVisibility::Public,
        };

        for decorator in &func.decorators {
            match DecoratorClass::recognize(&decorator.name) {
                DecoratorClass::NativeOnly => {
                    decl.native = true;
                    decl.visibility = NativeVisibility::ImplementationOnly;
                }
                DecoratorClass::NativePublic => decl.native = true,
                DecoratorClass::Property if parent.is_some() => {
                    decl.accessor = Some(Accessor {
                        property: func.name.clone(),
                        role: AccessorRole::Getter,
                    });
                }
                DecoratorClass::Accessor { property, role } if parent.is_some() => {
                    decl.accessor = Some(Accessor { property, role });
                }
                _ => {}
            }
        }

        decl.annotation = func.return_annotation.clone();
        decl.native_type = func.native_return.clone();
        decl.docstring = func.doc.as_ref().and_then(|doc| clean_docstring(&doc.value));
        decl.is_async = func.is_async;
        decl.decorators = func
            .decorators
            .iter()
            .map(|d| DecoratorRef {
                name: d.name.clone(),
                args: d.args.clone(),
                span: d.span,
            })
            .collect();
        decl.params = func
            .params
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                kind: p.kind,
                annotation: p.annotation.clone(),
                native_type: p.native_type.clone(),
                has_default: p.default.is_some(),
            })
            .collect();

        if let (Some(accessor), Some(class)) = (&decl.accessor, parent) {
            self.module
                .property_links
                .entry((class.to_string(), accessor.property.clone()))
                .or_default()
                .set(accessor.role, decl.source_order);
        }

        decl
    }

    fn class(&mut self, class: &ClassDef, parent: Option<&str>) -> Declaration {
        let mut decl = self.declare(DeclKind::Class, &class.name, parent, class.span);
        let cclass = class.decorators.iter().any(|d| d.name == "cython.cclass");
        decl.native = class.native || cclass;
        decl.visibility = if decl.native {
            NativeVisibility::Hybrid
        } else {
            NativeVisibility::Public
        };
        decl.bases = class.bases.clone();
        decl.decorators = class
            .decorators
            .iter()
            .map(|d| DecoratorRef {
                name: d.name.clone(),
                args: d.args.clone(),
                span: d.span,
            })
            .collect();

        let mut body = class.body.as_slice();
        if let Some(Stmt::Docstring(doc)) = body.first() {
            decl.docstring = clean_docstring(&doc.value);
            body = &body[1..];
        }
        let qualified = decl.qualified_name.clone();
        decl.children = self.extract_body(body, Some(&qualified));
        decl
    }

    fn variable(&mut self, var: &VariableDecl, parent: Option<&str>) -> Declaration {
        let mut decl = self.declare(DeclKind::Attribute, &var.name, parent, var.span);
        decl.native = var.kind != DefKind::Python;
        decl.visibility = match var.kind {
            DefKind::Python | DefKind::Cpdef => NativeVisibility::Public,
            // public/readonly attributes of extension types are Python-visible;
            // at module level they are C exports
            DefKind::Cdef if parent.is_some() && (var.modifiers.public || var.modifiers.readonly) => {
                NativeVisibility::Hybrid
            }
            DefKind::Cdef => NativeVisibility::ImplementationOnly,
        };
        decl.annotation = var.annotation.clone();
        decl.native_type = var.native_type.clone();

        if parent.is_none() && var.name == CIMPORT_TYPES_ATTRIBUTE {
            self.cimport_types = var.value.clone();
        }
        decl
    }

    fn import(&mut self, import: &ImportStmt, parent: Option<&str>) -> Vec<Declaration> {
        let mut decls = Vec::new();
        for name in &import.names {
            let binding = self.binding(import, name);
            let bound = binding.bound_name.clone();
            let reexport = binding.reexport;
            self.module.imports.push(binding);

            if reexport {
                let mut decl = self.declare(DeclKind::Import, &bound, parent, import.span);
                decl.import = Some(self.module.imports.len() - 1);
                decls.push(decl);
            }
        }
        decls
    }

    fn binding(&self, import: &ImportStmt, name: &ImportName) -> ImportBinding {
        let reexport = name.name != "*" && name.alias.as_deref() == Some(name.name.as_str());
        match &import.from_module {
            Some(written) => ImportBinding {
                bound_name: name.alias.clone().unwrap_or_else(|| name.name.clone()),
                written_module: written.clone(),
                module: self.absolute_module(written),
                member: Some(name.name.clone()),
                alias: name.alias.clone(),
                cimport: import.cimport,
                reexport,
                span: import.span,
            },
            None => {
                // `import a.b` binds `a`
                let bound = match &name.alias {
                    Some(alias) => alias.clone(),
                    None => name.name.split('.').next().unwrap_or(&name.name).to_string(),
                };
                ImportBinding {
                    bound_name: bound,
                    written_module: name.name.clone(),
                    module: name.name.clone(),
                    member: None,
                    alias: name.alias.clone(),
                    cimport: import.cimport,
                    reexport,
                    span: import.span,
                }
            }
        }
    }

    /// Resolve a possibly relative module path against this module's package.
    fn absolute_module(&self, written: &str) -> String {
        let dots = written.chars().take_while(|c| *c == '.').count();
        if dots == 0 {
            return written.to_string();
        }

        let mut segments: Vec<&str> = self
            .module
            .package_path()
            .split('.')
            .filter(|s| !s.is_empty())
            .collect();
        for _ in 1..dots {
            segments.pop();
        }
        let rest = &written[dots..];
        if !rest.is_empty() {
            segments.push(rest);
        }
        segments.join(".")
    }

    fn property_block(&mut self, block: &PropertyBlock, parent: Option<&str>) -> Declaration {
        let mut decl = self.declare(DeclKind::Property, &block.name, parent, block.span);
        decl.native = true;

        let mut body = block.body.as_slice();
        if let Some(Stmt::Docstring(doc)) = body.first() {
            decl.docstring = clean_docstring(&doc.value);
            body = &body[1..];
        }

        let qualified = decl.qualified_name.clone();
        let key = (parent.unwrap_or_default().to_string(), block.name.clone());
        for stmt in body {
            let Stmt::Function(func) = stmt else {
                continue;
            };
            let mut child = self.function(func, Some(&qualified));
            let role = match func.name.as_str() {
                "__get__" => Some(AccessorRole::Getter),
                "__set__" => Some(AccessorRole::Setter),
                "__del__" => Some(AccessorRole::Deleter),
                _ => None,
            };
            if let Some(role) = role {
                child.accessor = Some(Accessor {
                    property: block.name.clone(),
                    role,
                });
                self.module
                    .property_links
                    .entry(key.clone())
                    .or_default()
                    .set(role, child.source_order);
            }
            decl.children.push(child);
        }
        decl
    }

    fn enumeration(&mut self, def: &EnumDef, parent: Option<&str>) -> Declaration {
        let visibility = if def.public {
            NativeVisibility::Public
        } else {
            NativeVisibility::ImplementationOnly
        };
        let mut decl = self.declare(DeclKind::Class, &def.name, parent, def.span);
        decl.native = true;
        decl.visibility = visibility;
        decl.docstring = def.doc.as_ref().and_then(|doc| clean_docstring(&doc.value));

        let qualified = decl.qualified_name.clone();
        for member in &def.members {
            let mut child = self.declare(DeclKind::Attribute, member, Some(&qualified), def.span);
            child.native = true;
            child.visibility = visibility;
            child.annotation = Some("int".to_string());
            decl.children.push(child);
        }
        decl
    }

    fn native(&mut self, native: &NativeDecl, parent: Option<&str>) -> Declaration {
        let (kind, label) = match native.kind {
            NativeKind::Struct => (DeclKind::Class, "struct"),
            NativeKind::Union => (DeclKind::Class, "union"),
            NativeKind::Enum => (DeclKind::Class, "enum"),
            NativeKind::Fused => (DeclKind::Class, "fused"),
            NativeKind::Ctypedef => (DeclKind::Attribute, "ctypedef"),
            NativeKind::Define => (DeclKind::Attribute, "DEF"),
            NativeKind::Extern => (DeclKind::Opaque, "extern"),
            NativeKind::Include => (DeclKind::Opaque, "include"),
            NativeKind::Block => (DeclKind::Opaque, "cdef"),
        };
        let name = native
            .name
            .clone()
            .unwrap_or_else(|| format!("<{} line {}>", label, native.span.line));
        let mut decl = self.declare(kind, &name, parent, native.span);
        decl.native = true;
        decl.visibility = NativeVisibility::ImplementationOnly;
        if kind == DeclKind::Opaque {
            decl.opaque_text = self.first_line(native.span);
        }
        decl
    }

    fn unsupported(&mut self, unsupported: &Unsupported, parent: Option<&str>) -> Declaration {
        let name = format!("<line {}>", unsupported.span.line);
        let mut decl = self.declare(DeclKind::Opaque, &name, parent, unsupported.span);
        decl.opaque_text = Some(unsupported.text.clone());
        decl.opaque_reason = unsupported.reason.clone();
        decl
    }

    fn first_line(&self, span: Span) -> Option<String> {
        self.module
            .source
            .get(span.start..span.end)
            .and_then(|text| text.lines().next())
            .map(|line| line.trim().to_string())
    }

    fn apply_cimport_types(&mut self, text: &str) {
        let inner = text
            .trim()
            .trim_start_matches(['(', '[', '{'])
            .trim_end_matches([')', ']', '}']);
        for entry in inner.split(',') {
            let entry = entry.trim().trim_matches(['"', '\'']);
            if entry.is_empty() {
                continue;
            }
            match self.cimport_type(entry) {
                Some(reference) => {
                    if !self.module.explicit_cimport_types.contains(&reference) {
                        self.module.explicit_cimport_types.push(reference);
                    }
                }
                None => tracing::debug!(
                    module = %self.module.path,
                    entry,
                    "ignoring {} entry with no owning module",
                    CIMPORT_TYPES_ATTRIBUTE
                ),
            }
        }
    }

    /// Resolve one `__cimport_types__` entry through the module's imports.
    fn cimport_type(&self, entry: &str) -> Option<TypeReference> {
        let (root, rest) = match entry.split_once('.') {
            Some((root, rest)) => (root, Some(rest)),
            None => (entry, None),
        };

        match (self.module.binding(root), rest) {
            (Some((_, binding)), None) => {
                let member = binding.member.as_ref().filter(|m| *m != "*")?;
                Some(TypeReference::new(
                    member.clone(),
                    Some(binding.module.clone()),
                    ResolvedVia::Override,
                ))
            }
            (Some((_, binding)), Some(rest)) => {
                let full = match (&binding.member, &binding.alias) {
                    (Some(member), _) => format!("{}.{}.{}", binding.module, member, rest),
                    (None, Some(_)) => format!("{}.{}", binding.module, rest),
                    (None, None) => entry.to_string(),
                };
                TypeReference::from_qualified(&full, ResolvedVia::Override)
            }
            (None, Some(_)) => TypeReference::from_qualified(entry, ResolvedVia::Override),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::ParamKind;
    use crate::parser::parse_module;

    fn extract(path: &str, source: &str) -> Module {
        let tree = parse_module(source).unwrap();
        extract_module(path, source, false, &tree)
    }

    #[test]
    fn test_visibility_qualifiers() {
        let module = extract(
            "m",
            "def a(): pass\ncpdef int b(): return 1\ncdef int c(): return 1\ncdef class D:\n    pass\n",
        );
        let vis: Vec<_> = module.declarations.iter().map(|d| d.visibility).collect();
        assert_eq!(
            vis,
            vec![
                NativeVisibility::Public,
                NativeVisibility::Public,
                NativeVisibility::ImplementationOnly,
                NativeVisibility::Hybrid
            ]
        );
        assert!(!module.declarations[0].native);
        assert!(module.declarations[1].native);
        assert_eq!(module.declarations[1].native_type.as_deref(), Some("int"));
    }

    #[test]
    fn test_source_order_and_qualified_names() {
        let module = extract(
            "m",
            "class A:\n    def f(self): pass\n    def g(self): pass\ndef h(): pass\n",
        );
        let mut seen = Vec::new();
        module.walk(|d| seen.push((d.qualified_name.clone(), d.source_order)));
        assert_eq!(
            seen,
            vec![
                ("A".to_string(), 0),
                ("A.f".to_string(), 1),
                ("A.g".to_string(), 2),
                ("h".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_docstrings() {
        let source = "\"\"\"Module doc.\"\"\"\nx: int = 1\n\"\"\"About x.\"\"\"\nclass A:\n    '''\n    Class doc.\n    '''\n    def f(self):\n        \"Fn doc.\"\n";
        let module = extract("m", source);
        assert_eq!(module.docstring.as_deref(), Some("Module doc."));
        assert_eq!(module.declarations[0].docstring.as_deref(), Some("About x."));
        let class = &module.declarations[1];
        assert_eq!(class.docstring.as_deref(), Some("Class doc."));
        assert_eq!(class.children[0].docstring.as_deref(), Some("Fn doc."));
    }

    #[test]
    fn test_import_bindings() {
        let module = extract(
            "pkg.sub.m",
            "import os.path\nimport numpy as np\nfrom . cimport sibling\nfrom ..top import T as U\nfrom x import y as y\n",
        );
        let bound: Vec<_> = module.imports.iter().map(|b| b.bound_name.as_str()).collect();
        assert_eq!(bound, vec!["os", "np", "sibling", "U", "y"]);
        assert_eq!(module.imports[2].module, "pkg.sub");
        assert!(module.imports[2].cimport);
        assert_eq!(module.imports[3].module, "pkg.top");
        assert_eq!(module.imports[3].written_module, "..top");
        assert!(module.imports[4].reexport);

        // only the re-export is a declaration
        assert_eq!(module.declarations.len(), 1);
        assert_eq!(module.declarations[0].kind, DeclKind::Import);
        assert_eq!(module.declarations[0].import, Some(4));
    }

    #[test]
    fn test_decorated_property_link() {
        let source = "class A:\n    @property\n    def x(self) -> int:\n        return 1\n    @x.setter\n    def x(self, v: int):\n        pass\n";
        let module = extract("m", source);
        let link = module.property_links[&("A".to_string(), "x".to_string())];
        assert_eq!(link.getter, Some(1));
        assert_eq!(link.setter, Some(2));
        let setter = &module.declarations[0].children[1];
        assert_eq!(setter.accessor.as_ref().map(|a| a.role), Some(AccessorRole::Setter));
    }

    #[test]
    fn test_legacy_property_block() {
        let source = "cdef class A:\n    property size:\n        \"Size.\"\n        def __get__(self):\n            return 1\n        def __set__(self, value):\n            pass\n";
        let module = extract("m", source);
        let prop = &module.declarations[0].children[0];
        assert_eq!(prop.kind, DeclKind::Property);
        assert_eq!(prop.docstring.as_deref(), Some("Size."));
        assert_eq!(prop.children.len(), 2);
        let link = module.property_links[&("A".to_string(), "size".to_string())];
        assert_eq!(link.getter, Some(prop.children[0].source_order));
        assert_eq!(link.setter, Some(prop.children[1].source_order));
    }

    #[test]
    fn test_cpdef_enum_becomes_class() {
        let module = extract("m", "cpdef enum Color:\n    RED\n    GREEN\n");
        let class = &module.declarations[0];
        assert_eq!(class.kind, DeclKind::Class);
        assert_eq!(class.visibility, NativeVisibility::Public);
        assert_eq!(class.children.len(), 2);
        assert_eq!(class.children[1].annotation.as_deref(), Some("int"));
    }

    #[test]
    fn test_native_and_unsupported_constructs() {
        let module = extract("m", "ctypedef int myint\ncdef struct S:\n    int a\nif X:\n    pass\n");
        assert_eq!(module.declarations[0].kind, DeclKind::Attribute);
        assert_eq!(module.declarations[0].visibility, NativeVisibility::ImplementationOnly);
        assert_eq!(module.declarations[1].kind, DeclKind::Class);
        let opaque = &module.declarations[2];
        assert_eq!(opaque.kind, DeclKind::Opaque);
        assert_eq!(opaque.visibility, NativeVisibility::Public);
        assert_eq!(opaque.opaque_text.as_deref(), Some("if X:"));
    }

    #[test]
    fn test_cdef_attributes_in_class() {
        let module = extract("m", "cdef class A:\n    cdef public int x\n    cdef int hidden\n");
        let children = &module.declarations[0].children;
        assert_eq!(children[0].visibility, NativeVisibility::Hybrid);
        assert_eq!(children[1].visibility, NativeVisibility::ImplementationOnly);
    }

    #[test]
    fn test_cimport_types_attribute() {
        let source = "from pkg.a cimport T\ncimport pkg.b as b\n__cimport_types__ = (T, b.U, pkg.c.V)\n";
        let module = extract("pkg.m", source);
        let refs: Vec<_> = module
            .explicit_cimport_types
            .iter()
            .map(|r| (r.module.clone().unwrap_or_default(), r.name.clone()))
            .collect();
        assert_eq!(
            refs,
            vec![
                ("pkg.a".to_string(), "T".to_string()),
                ("pkg.b".to_string(), "U".to_string()),
                ("pkg.c".to_string(), "V".to_string())
            ]
        );
    }

    #[test]
    fn test_parameters() {
        let module = extract("m", "cpdef f(int x, y=3, *args, **kw):\n    pass\n");
        let params = &module.declarations[0].params;
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].native_type.as_deref(), Some("int"));
        assert!(params[1].has_default);
        assert_eq!(params[2].kind, ParamKind::VarPositional);
    }

    #[test]
    fn test_cython_cfunc_decorator() {
        let module = extract("m", "import cython\n@cython.cfunc\ndef f(): pass\n");
        assert_eq!(module.declarations[0].visibility, NativeVisibility::ImplementationOnly);
    }
}

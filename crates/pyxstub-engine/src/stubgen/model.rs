//! Declaration model shared by every pipeline stage.
//!
//! Declarations are built once by the extractor and never restructured.
//! Later stages only fill two write-once slots: the classifier's
//! [`Decision`] and the resolver's [`Resolution`].

use crate::parser::ast::ParamKind;
use crate::parser::token::Span;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Module,
    Class,
    Function,
    Method,
    Attribute,
    Property,
    Import,
    /// A statement that was not understood, kept for diagnostics only
    Opaque,
}

/// Visibility qualifier as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeVisibility {
    /// Callable from Python (`def`, `cpdef`, plain assignments)
    Public,
    /// Only reachable from native code (`cdef`, structs, ctypedefs)
    ImplementationOnly,
    /// Both (`cdef class`, `cdef public`/`readonly` attributes)
    Hybrid,
}

impl NativeVisibility {
    pub fn is_visible(self) -> bool {
        !matches!(self, NativeVisibility::ImplementationOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorRole {
    Getter,
    Setter,
    Deleter,
}

/// Marks a declaration as one accessor of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub property: String,
    pub role: AccessorRole,
}

/// Getter/setter/deleter of one property, by `source_order`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyLink {
    pub getter: Option<u32>,
    pub setter: Option<u32>,
    pub deleter: Option<u32>,
}

impl PropertyLink {
    pub fn set(&mut self, role: AccessorRole, order: u32) {
        let slot = match role {
            AccessorRole::Getter => &mut self.getter,
            AccessorRole::Setter => &mut self.setter,
            AccessorRole::Deleter => &mut self.deleter,
        };
        slot.get_or_insert(order);
    }
}

/// `(declaring class qualified name, property name)`
pub type PropertyKey = (String, String);

/// A decorator as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratorRef {
    pub name: String,
    pub args: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<String>,
    pub native_type: Option<String>,
    pub has_default: bool,
}

/// How a referenced type name was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedVia {
    /// A builtin name; needs no import
    Builtin,
    /// Declared by the module itself
    Local,
    /// Bound by the module's own import at this index of `Module::imports`
    Binding(usize),
    /// Found by following `cimport`s from the module
    ImportChain { hops: usize },
    /// Declared by an explicit cimport-types override
    Override,
    /// Canonical import of a preserved decorator
    Canonical,
    Unresolved,
}

/// A dotted type name plus the module it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeReference {
    pub name: String,
    /// Owning module path, `None` for builtins, locals and unresolved names
    pub module: Option<String>,
    pub via: ResolvedVia,
}

impl TypeReference {
    pub fn new(name: impl Into<String>, module: Option<String>, via: ResolvedVia) -> Self {
        Self {
            name: name.into(),
            module,
            via,
        }
    }

    /// Parse `pkg.mod.Name` into `Name` owned by `pkg.mod`.
    pub fn from_qualified(text: &str, via: ResolvedVia) -> Option<Self> {
        let text = text.trim();
        let (module, name) = text.rsplit_once('.')?;
        if module.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(name, Some(module.to_string()), via))
    }

    /// Whether the stub needs an import statement that is not one of the
    /// module's own.
    pub fn needs_synthesized_import(&self) -> bool {
        matches!(
            self.via,
            ResolvedVia::ImportChain { .. } | ResolvedVia::Override | ResolvedVia::Canonical
        )
    }
}

/// One name bound by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Name bound in the module namespace (`np`, `os`, `T`)
    pub bound_name: String,
    /// Module as written, leading dots kept
    pub written_module: String,
    /// Absolute module path
    pub module: String,
    /// Imported member of a `from` import
    pub member: Option<String>,
    pub alias: Option<String>,
    pub cimport: bool,
    /// `import x as x` / `from m import y as y`
    pub reexport: bool,
    pub span: Span,
}

impl ImportBinding {
    /// Render in Python form; `cimport` becomes `import`.
    pub fn render(&self) -> String {
        let base = match &self.member {
            Some(member) => format!("from {} import {}", self.written_module, member),
            None => format!("import {}", self.written_module),
        };
        match &self.alias {
            Some(alias) => format!("{} as {}", base, alias),
            None => base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderedKind {
    Class,
    Function,
    Attribute,
    Import,
}

/// Why a declaration is left out of the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    ImplementationOnly,
    DisallowedName,
    PrivateDunder,
    /// Setter/deleter, or accessor of a collapsed legacy property
    PropertyAccessor,
    Unsupported,
    /// Nested in an excluded declaration
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedParam {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<String>,
    pub has_default: bool,
}

/// The type-bearing parts of a rendered declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Attribute type or function return type
    pub type_text: Option<String>,
    pub params: Vec<RenderedParam>,
    pub bases: Vec<String>,
}

impl Signature {
    /// Every annotation text of the signature, in rendering order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.bases
            .iter()
            .map(String::as_str)
            .chain(self.params.iter().filter_map(|p| p.annotation.as_deref()))
            .chain(self.type_text.as_deref())
    }

    /// Apply `f` to every annotation text.
    pub fn map_texts(&self, mut f: impl FnMut(&str) -> String) -> Signature {
        Signature {
            type_text: self.type_text.as_deref().map(&mut f),
            params: self
                .params
                .iter()
                .map(|p| RenderedParam {
                    annotation: p.annotation.as_deref().map(&mut f),
                    ..p.clone()
                })
                .collect(),
            bases: self.bases.iter().map(|b| f(b)).collect(),
        }
    }
}

/// A decorator kept on the rendered declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDecorator {
    /// Text after `@`
    pub text: String,
    /// Import needed for the canonical form, as `(module, name)`
    pub canonical_import: Option<(String, String)>,
}

/// The classifier's verdict, written once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub include: bool,
    pub rendered_kind: RenderedKind,
    pub signature: Signature,
    pub decorators: Vec<RenderedDecorator>,
    pub exclusion: Option<Exclusion>,
}

impl Decision {
    pub fn excluded(kind: RenderedKind, reason: Exclusion) -> Self {
        Self {
            include: false,
            rendered_kind: kind,
            signature: Signature::default(),
            decorators: Vec::new(),
            exclusion: Some(reason),
        }
    }

    pub fn included(kind: RenderedKind, signature: Signature) -> Self {
        Self {
            include: true,
            rendered_kind: kind,
            signature,
            decorators: Vec::new(),
            exclusion: None,
        }
    }
}

/// The resolver's result, written once: the signature with unresolved
/// names replaced, plus every name it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub signature: Signature,
    pub references: Vec<TypeReference>,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
    /// Dotted name relative to the module (`Cls.meth`)
    pub qualified_name: String,
    pub visibility: NativeVisibility,
    /// Declared with native syntax (`cdef`/`cpdef`)
    pub native: bool,
    /// Python annotation; the return annotation for functions
    pub annotation: Option<String>,
    /// Native type as written; the return type for functions
    pub native_type: Option<String>,
    pub docstring: Option<String>,
    pub decorators: Vec<DecoratorRef>,
    pub params: Vec<Parameter>,
    pub bases: Vec<String>,
    pub is_async: bool,
    pub accessor: Option<Accessor>,
    /// Index into `Module::imports` for import declarations
    pub import: Option<usize>,
    /// Source text of an opaque declaration
    pub opaque_text: Option<String>,
    /// Why an opaque declaration could not be parsed
    pub opaque_reason: Option<String>,
    pub children: Vec<Declaration>,
    pub source_order: u32,
    pub span: Span,
    decision: OnceCell<Decision>,
    resolution: OnceCell<Resolution>,
}

impl Declaration {
    pub fn new(kind: DeclKind, name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            qualified_name: qualified_name.into(),
            visibility: NativeVisibility::Public,
            native: false,
            annotation: None,
            native_type: None,
            docstring: None,
            decorators: Vec::new(),
            params: Vec::new(),
            bases: Vec::new(),
            is_async: false,
            accessor: None,
            import: None,
            opaque_text: None,
            opaque_reason: None,
            children: Vec::new(),
            source_order: 0,
            span: Span::new(0, 0, 0, 0),
            decision: OnceCell::new(),
            resolution: OnceCell::new(),
        }
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.get()
    }

    /// Record the classifier's decision; fails if one was already recorded.
    pub fn decide(&self, decision: Decision) -> Result<(), Decision> {
        self.decision.set(decision)
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.get()
    }

    /// Record the resolver's result; fails if one was already recorded.
    pub fn resolve(&self, resolution: Resolution) -> Result<(), Resolution> {
        self.resolution.set(resolution)
    }

    pub fn is_included(&self) -> bool {
        self.decision().is_some_and(|d| d.include)
    }

    /// Depth-first walk over this declaration and its descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Declaration)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// One source module and everything extracted from it.
#[derive(Debug, Clone)]
pub struct Module {
    /// Dotted module path (`pkg.sub.mod`)
    pub path: String,
    pub file: Option<PathBuf>,
    pub source: String,
    /// An `__init__` module
    pub is_package: bool,
    pub docstring: Option<String>,
    pub declarations: Vec<Declaration>,
    /// Import bindings in source order
    pub imports: Vec<ImportBinding>,
    pub explicit_cimport_types: Vec<TypeReference>,
    /// Qualified name (relative to the module) to literal type text
    pub explicit_annotation_overrides: FxHashMap<String, String>,
    pub property_links: FxHashMap<PropertyKey, PropertyLink>,
}

impl Module {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file: None,
            source: source.into(),
            is_package: false,
            docstring: None,
            declarations: Vec::new(),
            imports: Vec::new(),
            explicit_cimport_types: Vec::new(),
            explicit_annotation_overrides: FxHashMap::default(),
            property_links: FxHashMap::default(),
        }
    }

    /// The package relative imports are resolved against.
    pub fn package_path(&self) -> &str {
        if self.is_package {
            &self.path
        } else {
            self.path.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
        }
    }

    /// The binding currently bound to `name` (later imports shadow earlier ones).
    pub fn binding(&self, name: &str) -> Option<(usize, &ImportBinding)> {
        self.imports
            .iter()
            .enumerate()
            .rev()
            .find(|(_, b)| b.bound_name == name)
    }

    /// The binding a dotted `reference` is reached through.
    ///
    /// Plain `import a.b` and `import a.c` both bind `a`; `a.b.T` needs the
    /// one whose module is the longest prefix of the reference. Otherwise
    /// the binding of the root name applies.
    pub fn binding_for(&self, reference: &str) -> Option<(usize, &ImportBinding)> {
        let root = reference.split('.').next().unwrap_or(reference);
        let submodule = self
            .imports
            .iter()
            .enumerate()
            .filter(|(_, b)| b.bound_name == root && b.member.is_none() && b.alias.is_none())
            .filter(|(_, b)| reference.strip_prefix(b.module.as_str()).is_some_and(|rest| rest.starts_with('.')))
            .max_by_key(|(index, b)| (b.module.len(), *index));
        submodule.or_else(|| self.binding(root))
    }

    /// Depth-first walk over every declaration.
    pub fn walk<'a>(&'a self, mut f: impl FnMut(&'a Declaration)) {
        for decl in &self.declarations {
            decl.walk(&mut f);
        }
    }

    /// Find a declaration by its `source_order`.
    pub fn find(&self, order: u32) -> Option<&Declaration> {
        let mut found = None;
        self.walk(|decl| {
            if decl.source_order == order {
                found = Some(decl);
            }
        });
        found
    }

    /// Find a declaration by module-relative qualified name.
    pub fn find_qualified(&self, qualified_name: &str) -> Option<&Declaration> {
        let mut found = None;
        self.walk(|decl| {
            if found.is_none() && decl.qualified_name == qualified_name {
                found = Some(decl);
            }
        });
        found
    }

    /// Whether `name` is an included top-level class or attribute.
    pub fn defines(&self, name: &str) -> bool {
        self.declarations.iter().any(|decl| {
            decl.name == name
                && decl.is_included()
                && matches!(decl.kind, DeclKind::Class | DeclKind::Attribute)
        })
    }
}

/// Every module of one stub-generation run, ordered by path.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub modules: Vec<Module>,
}

impl Package {
    pub fn new(mut modules: Vec<Module>) -> Self {
        modules.sort_by(|a, b| a.path.cmp(&b.path));
        Self { modules }
    }

    pub fn get(&self, path: &str) -> Option<&Module> {
        self.modules
            .binary_search_by(|m| m.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.modules[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }
}

//! End-to-end tests for the stub pipeline
//!
//! Each test feeds Cython sources through `StubGenerator` and checks the
//! rendered stub text and the diagnostics of the run.

use pyxstub_engine::{
    DiagnosticKind, Diagnostics, PackageReport, SourceFile, StubConfig, StubGenerator,
};

fn generator() -> StubGenerator {
    let mut config = StubConfig::default();
    config.stubgen.header = false;
    StubGenerator::new(config)
}

fn stub(source: &str) -> (String, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let text = generator()
        .generate_module(SourceFile::new("m", source), &mut diagnostics)
        .expect("module should generate");
    (text, diagnostics)
}

fn package(files: &[(&str, &str)]) -> PackageReport {
    generator().generate_package(
        files
            .iter()
            .map(|(module, source)| SourceFile::new(*module, *source))
            .collect(),
    )
}

const GEOMETRY: &str = r#""""Geometry helpers."""
import pprint
from typing import Optional
from libc.math cimport sqrt

DEF LIMIT = 10

cdef class Point:
    """A 2D point."""
    cdef public double x
    cdef readonly double y
    cdef double _cache
    """Cached norm."""

    def __init__(self, double x, double y):
        self.x = x
        self.y = y

    def __cinit__(self):
        pass

    @property
    def norm(self) -> float:
        return sqrt(self.x * self.x + self.y * self.y)

    @norm.setter
    def norm(self, value: float):
        pass

    cpdef Point scaled(self, double k):
        return Point(self.x * k, self.y * k)

    cdef double dot(self, Point other):
        """Inner product."""
        return self.x * other.x + self.y * other.y

cpdef int count(list items, int start=0):
    return len(items) + start

def find(name: str, default: Optional[Point] = None) -> Optional[Point]:
    """Look up a point."""
    return default

cdef int helper():
    """Helper doc."""
    return 0
"#;

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn test_implementation_only_declarations_and_their_docs_are_absent() {
    let (text, _) = stub(GEOMETRY);
    for hidden in ["helper", "Helper doc", "dot", "Inner product", "_cache", "Cached norm", "LIMIT", "__cinit__"] {
        assert!(!text.contains(hidden), "{:?} leaked into:\n{}", hidden, text);
    }
    assert!(text.contains("class Point:"));
    assert!(text.contains("    x: object\n"));
    assert!(text.contains("    y: object\n"));
}

#[test]
fn test_cpdef_without_python_type_is_opaque() {
    let (text, _) = stub("cpdef int f():\n    return 1\n");
    assert_eq!(text, "def f() -> object: ...\n");
}

#[test]
fn test_cdef_function_is_absent() {
    let (text, _) = stub("cdef int g():\n    return 0\ndef h() -> int:\n    return g()\n");
    assert_eq!(text, "def h() -> int: ...\n");
    assert!(!text.contains('g'));
}

#[test]
fn test_unsupported_statements_are_reported_not_rendered() {
    let (text, diagnostics) = stub("if True:\n    x = 1\ndef f() -> None: pass\n");
    assert_eq!(text, "def f() -> None: ...\n");
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnsupportedConstruct));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_property_pair_collapses_to_one_attribute() {
    let (text, _) = stub(GEOMETRY);
    assert_eq!(text.matches("norm").count(), 1, "{}", text);
    assert!(text.contains("    norm: float\n"));
}

#[test]
fn test_legacy_property_block_collapses() {
    let source = "cdef class Buffer:\n    property size:\n        def __get__(self):\n            return 1\n        def __set__(self, int value):\n            pass\n";
    let (text, _) = stub(source);
    assert_eq!(text, "class Buffer:\n    size: object\n");
}

// ============================================================================
// Imports
// ============================================================================

#[test]
fn test_unused_imports_are_omitted() {
    let (text, _) = stub(GEOMETRY);
    assert!(!text.contains("pprint"));
    assert!(!text.contains("sqrt"));
    assert!(text.contains("from typing import Optional\n"));
}

#[test]
fn test_unused_import_in_class_module() {
    let source = "import pprint\nimport os\n\nclass C:\n    def f(self, p: os.PathLike) -> None:\n        pprint.pprint(p)\n";
    let (text, _) = stub(source);
    assert_eq!(text, "import os\n\nclass C:\n    def f(self, p: os.PathLike) -> None: ...\n");
}

#[test]
fn test_reexports_are_kept() {
    let (text, _) = stub("from .core import Engine as Engine\nimport json\n");
    assert_eq!(text, "from .core import Engine as Engine\n");
}

// ============================================================================
// Cross-module resolution
// ============================================================================

#[test]
fn test_type_leaked_through_cimport_chain_is_imported_from_its_definer() {
    let report = package(&[
        ("pkg.a", "cdef class T:\n    pass\n"),
        ("pkg.b", "from pkg.a cimport T\n"),
        ("pkg.c", "from pkg cimport b\n\ncpdef make(T seed):\n    return seed\ndef build() -> T:\n    pass\n"),
    ]);
    assert!(!report.has_failures());
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

    let c = report.get("pkg.c").and_then(|m| m.stub()).unwrap();
    assert_eq!(
        c,
        "from pkg.a import T\n\ndef make(seed: object) -> object: ...\n\ndef build() -> T: ...\n"
    );
    assert_eq!(report.get("pkg.a").and_then(|m| m.stub()), Some("class T: ...\n"));
    assert_eq!(report.get("pkg.b").and_then(|m| m.stub()), Some(""));
}

#[test]
fn test_type_without_import_path_is_unresolved() {
    let report = package(&[
        ("pkg.a", "cdef class T:\n    pass\n"),
        ("pkg.c", "def build(items: list[T]) -> T:\n    pass\n"),
    ]);
    let c = report.get("pkg.c").and_then(|m| m.stub()).unwrap();
    assert_eq!(c, "def build(items: list[object]) -> object: ...\n");

    let warnings: Vec<_> = report
        .diagnostics
        .for_module("pkg.c")
        .filter(|d| d.kind == DiagnosticKind::UnresolvedTypeReference)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].qualified_name.as_deref(), Some("build"));
}

#[test]
fn test_relative_cimports_are_followed() {
    let report = package(&[
        ("pkg.types", "cdef class Vec:\n    pass\n"),
        ("pkg.ops", "from .types cimport Vec\n"),
        ("pkg.api", "from . cimport ops\n\ndef add(a: Vec, b: Vec) -> Vec:\n    pass\n"),
    ]);
    let api = report.get("pkg.api").and_then(|m| m.stub()).unwrap();
    assert!(api.starts_with("from pkg.types import Vec\n\n"), "{}", api);
}

// ============================================================================
// Overrides
// ============================================================================

#[test]
fn test_annotation_override_beats_opaque_fallback() {
    let config = StubConfig::parse(
        r#"
[stubgen]
header = false

[modules."m".annotations]
"Buffer.size" = "int"
"Buffer.count" = "int"
"#,
    )
    .unwrap();
    let source = "cdef class Buffer:\n    cdef public int count\n    property size:\n        def __get__(self):\n            return 1\n";
    let mut diagnostics = Diagnostics::new();
    let text = StubGenerator::new(config)
        .generate_module(SourceFile::new("m", source), &mut diagnostics)
        .unwrap();
    assert_eq!(text, "class Buffer:\n    count: int\n    size: int\n");
    assert!(diagnostics.is_empty());
}

#[test]
fn test_cimport_types_override_synthesizes_import() {
    let config = StubConfig::parse("[stubgen]\nheader = false\n[modules.\"m\"]\ncimport-types = [\"pkg.other.Handle\"]\n").unwrap();
    let mut diagnostics = Diagnostics::new();
    let text = StubGenerator::new(config)
        .generate_module(SourceFile::new("m", "def open() -> Handle:\n    pass\n"), &mut diagnostics)
        .unwrap();
    assert_eq!(text, "from pkg.other import Handle\n\ndef open() -> Handle: ...\n");
}

// ============================================================================
// Decorators
// ============================================================================

#[test]
fn test_canonical_decorators_synthesize_imports() {
    let source = "import functools\n\n@dataclass\nclass P:\n    x: int\n\nclass Q:\n    @staticmethod\n    def make() -> Q:\n        pass\n    @functools.cache\n    def cached(self) -> int:\n        pass\n";
    let (text, diagnostics) = stub(source);
    assert_eq!(
        text,
        "from dataclasses import dataclass\n\n@dataclass\nclass P:\n    x: int\n\nclass Q:\n    @staticmethod\n    def make() -> Q: ...\n    def cached(self) -> int: ...\n"
    );
    assert!(diagnostics.is_empty());
}

#[test]
fn test_unknown_decorator_is_dropped_with_note() {
    let (text, diagnostics) = stub("@app.route('/')\ndef index() -> str:\n    pass\n");
    assert_eq!(text, "def index() -> str: ...\n");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics.iter().next().map(|d| d.kind), Some(DiagnosticKind::DroppedDecorator));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_rendering_is_deterministic() {
    let generator = StubGenerator::default();
    let mut first = Diagnostics::new();
    let mut second = Diagnostics::new();
    let a = generator.generate_module(SourceFile::new("geo", GEOMETRY), &mut first).unwrap();
    let b = generator.generate_module(SourceFile::new("geo", GEOMETRY), &mut second).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.len(), second.len());
}

#[test]
fn test_stub_is_a_fixed_point() {
    let generator = StubGenerator::default();
    let mut diagnostics = Diagnostics::new();
    let first = generator
        .generate_module(SourceFile::new("geo", GEOMETRY), &mut diagnostics)
        .unwrap();
    assert!(first.starts_with("# This file was generated by pyxstub v"));
    assert!(first.contains("\"\"\"\nGeometry helpers.\n\"\"\""));

    let second = generator
        .generate_module(SourceFile::new("geo", first.as_str()), &mut diagnostics)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_cross_module_stub_is_a_fixed_point() {
    let report = package(&[
        ("pkg.a", "cdef class T:\n    pass\n"),
        ("pkg.c", "cimport pkg.a\n\ndef build() -> T:\n    pass\n"),
    ]);
    let c = report.get("pkg.c").and_then(|m| m.stub()).unwrap().to_string();
    assert_eq!(c, "from pkg.a import T\n\ndef build() -> T: ...\n");

    let mut diagnostics = Diagnostics::new();
    let again = generator()
        .generate_module(SourceFile::new("pkg.c", c.as_str()), &mut diagnostics)
        .unwrap();
    assert_eq!(again, c);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_parse_failure_is_reported_per_module() {
    let report = package(&[
        ("pkg.bad", "def f(:\n    x = \"open\n"),
        ("pkg.good", "def g() -> int:\n    pass\n"),
    ]);
    assert!(report.has_failures());
    assert_eq!(report.failed(), 1);
    assert_eq!(report.get("pkg.good").and_then(|m| m.stub()), Some("def g() -> int: ...\n"));

    let errors: Vec<_> = report.diagnostics.for_module("pkg.bad").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, DiagnosticKind::ParseFailure);
    assert_eq!(errors[0].code().as_str(), "E0001");
}

#[test]
fn test_any_opaque_type_is_imported() {
    let mut config = StubConfig::default();
    config.stubgen.header = false;
    config.stubgen.opaque_type = "Any".to_string();
    let generator = StubGenerator::new(config);

    for source in ["cpdef int f(int x):\n    return x\n", "from typing import Any\ncpdef int f(int x):\n    return x\n"] {
        let mut diagnostics = Diagnostics::new();
        let text = generator
            .generate_module(SourceFile::new("m", source), &mut diagnostics)
            .expect("module should generate");
        assert_eq!(text, "from typing import Any\n\ndef f(x: Any) -> Any: ...\n");
        assert!(diagnostics.is_empty());
    }
}

#[test]
fn test_docstring_with_non_ascii_indentation() {
    let (text, _) = stub("def f():\n    \"\"\"Summary.\n   a\n\u{a0}\u{a0}\u{a0}b\n    \"\"\"\n    pass\n");
    assert_eq!(
        text,
        "def f() -> object:\n    \"\"\"\n    Summary.\n       a\n    \u{a0}\u{a0}\u{a0}b\n    \"\"\"\n"
    );
}

#[test]
fn test_unicode_identifiers_are_accepted() {
    let (text, diagnostics) = stub("def area(r: float) -> float:\n    π = 3.14159\n    return π * r * r\n\ndef grösse(x: Maß) -> None:\n    pass\n");
    assert_eq!(
        text,
        "def area(r: float) -> float: ...\n\ndef grösse(x: object) -> None: ...\n"
    );
    let unresolved: Vec<_> = diagnostics.iter().collect();
    assert_eq!(unresolved.len(), 1);
    assert!(unresolved[0].message.contains("'Maß'"));
}

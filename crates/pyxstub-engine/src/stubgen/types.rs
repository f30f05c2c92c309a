//! Annotation text utilities.
//!
//! Annotations are kept as text. These helpers find the names an
//! annotation references, rewrite them, and map native C types onto
//! Python types.

/// Native type names and the Python type they map to.
const TRANSLATIONS: &[(&str, &str)] = &[
    ("bint", "bool"),
    ("unicode", "str"),
    ("char", "int"),
    ("short", "int"),
    ("Py_UNICODE", "int"),
    ("Py_UCS4", "int"),
    ("long", "int"),
    ("longlong", "int"),
    ("Py_hash_t", "int"),
    ("Py_ssize_t", "int"),
    ("size_t", "int"),
    ("ssize_t", "int"),
    ("ptrdiff_t", "int"),
    ("double", "float"),
    ("longdouble", "float"),
    ("floatcomplex", "complex"),
    ("doublecomplex", "complex"),
    ("longdoublecomplex", "complex"),
];

/// Names that never need an import.
const BUILTINS: &[&str] = &[
    "ArithmeticError", "AssertionError", "AttributeError", "BaseException", "BufferError",
    "BytesWarning", "DeprecationWarning", "EOFError", "Ellipsis", "EnvironmentError",
    "Exception", "FileExistsError", "FileNotFoundError", "FloatingPointError", "FutureWarning",
    "GeneratorExit", "IOError", "ImportError", "IndexError", "KeyError", "KeyboardInterrupt",
    "LookupError", "MemoryError", "NameError", "NotImplemented", "NotImplementedError",
    "OSError", "OverflowError", "PermissionError", "RecursionError", "ReferenceError",
    "RuntimeError", "RuntimeWarning", "StopAsyncIteration", "StopIteration", "SyntaxError",
    "SystemError", "SystemExit", "TimeoutError", "TypeError", "UnicodeDecodeError",
    "UnicodeEncodeError", "UnicodeError", "UserWarning", "ValueError", "Warning",
    "ZeroDivisionError", "bool", "bytearray", "bytes", "callable", "classmethod", "complex",
    "dict", "enumerate", "float", "frozenset", "int", "list", "memoryview", "object",
    "property", "range", "set", "slice", "staticmethod", "str", "super", "tuple", "type",
    "zip",
];

/// Words that look like names but are never references.
const NON_REFERENCES: &[&str] = &[
    "None", "True", "False", "and", "or", "not", "in", "is", "if", "else", "lambda",
];

/// Qualifiers dropped from native types before translation.
const NATIVE_QUALIFIERS: &[&str] = &["const", "volatile", "signed", "unsigned", "struct", "enum"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// A dotted name occurrence inside annotation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NameSpan {
    start: usize,
    /// End of the whole dotted chain
    end: usize,
    /// End of the first segment
    root_end: usize,
}

// Non-ASCII bytes only occur inside identifiers, so whole multi-byte
// characters are taken as name characters.
fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || !b.is_ascii()
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || !b.is_ascii()
}

fn name_spans(text: &str) -> Vec<NameSpan> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if c == b'"' || c == b'\'' {
            quote = Some(c);
            i += 1;
            continue;
        }
        if !is_ident_start(c) {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && is_ident_char(bytes[i]) {
            i += 1;
        }
        let root_end = i;
        while i + 1 < bytes.len() && bytes[i] == b'.' && is_ident_start(bytes[i + 1]) {
            i += 1;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
        }
        let end = i;

        let attribute = text[..start].trim_end().ends_with('.');
        let numeric = start > 0 && bytes[start - 1].is_ascii_digit();
        let after = text[end..].trim_start();
        let keyword_arg = after.starts_with('=') && !after.starts_with("==");
        let word = &text[start..root_end];
        if attribute || numeric || keyword_arg || NON_REFERENCES.contains(&word) {
            continue;
        }
        spans.push(NameSpan {
            start,
            end,
            root_end,
        });
    }

    spans
}

/// Dotted names referenced by an annotation, in order of first use.
pub fn referenced_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for span in name_spans(text) {
        let chain = &text[span.start..span.end];
        if !names.iter().any(|n| n == chain) {
            names.push(chain.to_string());
        }
    }
    names
}

/// First segment of a dotted name.
pub fn root_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Replace every dotted name whose root satisfies `should_replace`.
pub fn replace_names(text: &str, should_replace: impl Fn(&str) -> bool, replacement: &str) -> String {
    rewrite(text, |text, span| {
        should_replace(&text[span.start..span.root_end]).then(|| replacement.to_string())
    })
}

/// Map native type names used inside a Python annotation (`bint` → `bool`).
pub fn translate_annotation(text: &str) -> String {
    rewrite(text, |text, span| {
        if span.end != span.root_end {
            return None;
        }
        translation_of(&text[span.start..span.end]).map(str::to_string)
    })
}

fn rewrite(text: &str, mut replace: impl FnMut(&str, NameSpan) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in name_spans(text) {
        if let Some(replacement) = replace(text, span) {
            out.push_str(&text[last..span.start]);
            out.push_str(&replacement);
            last = span.end;
        }
    }
    out.push_str(&text[last..]);
    out
}

fn translation_of(name: &str) -> Option<&'static str> {
    TRANSLATIONS
        .iter()
        .find(|(native, _)| *native == name)
        .map(|(_, python)| *python)
}

/// Python type for a native declaration type, if it has one.
///
/// Pointers, C arrays, references and memoryviews have no Python
/// counterpart and yield `None`.
pub fn translate_native_type(native: &str) -> Option<String> {
    let native = native.trim();
    if native.is_empty()
        || native.contains('*')
        || native.contains('&')
        || native.contains(':')
        || native.contains('(')
    {
        return None;
    }

    let words: Vec<&str> = native
        .split_whitespace()
        .filter(|w| !NATIVE_QUALIFIERS.contains(w))
        .collect();

    let joined = match words.as_slice() {
        // `unsigned` / `signed` alone
        [] => return Some("int".to_string()),
        [single] => single.to_string(),
        // `long long`, `long double`, `double complex`, `unsigned long int` ...
        many if many.iter().all(|w| !w.contains('[') && !w.contains('.')) => {
            let collapsed: String = many.iter().filter(|w| **w != "int").copied().collect();
            if collapsed.is_empty() {
                "int".to_string()
            } else {
                collapsed
            }
        }
        _ => return None,
    };

    if joined.contains('[') && !joined.contains(':') {
        // C++ templates such as `vector[int]` are not Python types
        let base = joined.split('[').next().unwrap_or_default();
        if translation_of(base).is_some() || base == "int" || base == "float" {
            return None;
        }
    }

    Some(translation_of(&joined).map(str::to_string).unwrap_or(joined))
}

/// Normalize a docstring the way `inspect.cleandoc` does.
///
/// Returns `None` for docstrings that are empty after cleaning.
pub fn clean_docstring(raw: &str) -> Option<String> {
    let expanded = expand_tabs(raw);
    let lines: Vec<&str> = expanded.split('\n').collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| leading_spaces(line))
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let line = if i == 0 {
            line.trim_start()
        } else if leading_spaces(line) >= margin {
            &line[margin..]
        } else {
            line.trim_start_matches(' ')
        };
        cleaned.push(line.trim_end().to_string());
    }

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join("\n"))
    }
}

/// Indentation width in ASCII spaces. Tabs are already expanded, and other
/// whitespace counts as text.
fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn expand_tabs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\t' => {
                let spaces = 8 - column % 8;
                out.extend(std::iter::repeat(' ').take(spaces));
                column += spaces;
            }
            '\n' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_names() {
        assert_eq!(
            referenced_names("Dict[str, np.ndarray] | np.ndarray"),
            vec!["Dict", "str", "np.ndarray"]
        );
        assert_eq!(referenced_names("Literal['a', \"B\"]"), vec!["Literal"]);
        assert_eq!(referenced_names("Base, metaclass=ABCMeta"), vec!["Base", "ABCMeta"]);
        assert_eq!(referenced_names("dict[Größe, geo.Punkt]"), vec!["dict", "Größe", "geo.Punkt"]);
        assert_eq!(root_name("geo.Punkt"), "geo");
        assert_eq!(replace_names("list[Größe]", |root| root == "Größe", "object"), "list[object]");
    }

    #[test]
    fn test_replace_names_replaces_whole_chain() {
        let text = replace_names("list[mod.T] | T2", |root| root != "list", "object");
        assert_eq!(text, "list[object] | object");
    }

    #[test]
    fn test_translate_annotation() {
        assert_eq!(translate_annotation("list[bint]"), "list[bool]");
        assert_eq!(translate_annotation("Py_ssize_t"), "int");
        assert_eq!(translate_annotation("cython.double"), "cython.double");
    }

    #[test]
    fn test_translate_native_type() {
        assert_eq!(translate_native_type("int").as_deref(), Some("int"));
        assert_eq!(translate_native_type("unsigned long long").as_deref(), Some("int"));
        assert_eq!(translate_native_type("long double").as_deref(), Some("float"));
        assert_eq!(translate_native_type("double complex").as_deref(), Some("complex"));
        assert_eq!(translate_native_type("const char *"), None);
        assert_eq!(translate_native_type("double[:, ::1]"), None);
        assert_eq!(translate_native_type("list").as_deref(), Some("list"));
        assert_eq!(translate_native_type("Foo").as_deref(), Some("Foo"));
    }

    #[test]
    fn test_clean_docstring() {
        let raw = "\n    Summary line.\n\n        Indented more.\n    ";
        assert_eq!(
            clean_docstring(raw).as_deref(),
            Some("Summary line.\n\n    Indented more.")
        );
        assert_eq!(clean_docstring("One line."), Some("One line.".to_string()));
        assert_eq!(clean_docstring("   \n  "), None);
    }

    #[test]
    fn test_clean_docstring_non_ascii_indentation() {
        assert_eq!(
            clean_docstring("Summary.\n   a\n\u{a0}\u{a0}\u{a0}b\n    ").as_deref(),
            Some("Summary.\n   a\n\u{a0}\u{a0}\u{a0}b")
        );
        assert_eq!(
            clean_docstring("Summary.\n    a\n  \u{3000}b\n").as_deref(),
            Some("Summary.\n  a\n\u{3000}b")
        );
    }

    #[test]
    fn test_is_dunder() {
        assert!(is_dunder("__init__"));
        assert!(!is_dunder("__x"));
        assert!(!is_dunder("____"));
    }
}

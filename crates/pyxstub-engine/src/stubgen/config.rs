//! Stub generation configuration (pyxstub.toml)
//!
//! Holds the rendering options and the per-module override hooks:
//! annotation overrides keyed by qualified name, and cimport-type
//! overrides naming types a module may use without importing them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::stubgen::diagnostic::{DiagnosticKind, Diagnostics, StubDiagnostic};
use crate::stubgen::model::{Module, ResolvedVia, TypeReference};
use crate::stubgen::resolve::opaque_reference;

/// Name of the configuration file looked up at the package root
pub const CONFIG_FILE: &str = "pyxstub.toml";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Validation error
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// The whole `pyxstub.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StubConfig {
    #[serde(default)]
    pub stubgen: StubgenOptions,

    /// Package-wide annotation overrides keyed by fully qualified name
    /// (`"pkg.mod.f"`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Per-module overrides keyed by dotted module path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, ModuleOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StubgenOptions {
    /// Rendering of the opaque type: a builtin name or `Any`
    /// (default: "object")
    #[serde(default = "default_opaque_type")]
    pub opaque_type: String,

    /// Emit the "generated by" header comment
    #[serde(default = "default_true")]
    pub header: bool,

    /// Map native C types (int, double, bint...) onto Python types
    #[serde(default)]
    pub translate_native_types: bool,

    /// Dunder methods that are rendered
    #[serde(default = "default_allowed_dunders")]
    pub allowed_dunders: Vec<String>,

    /// Glob patterns, relative to the package root, of sources to skip
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_opaque_type() -> String {
    "object".to_string()
}

fn default_true() -> bool {
    true
}

fn default_allowed_dunders() -> Vec<String> {
    ["__init__", "__len__", "__enter__", "__exit__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for StubgenOptions {
    fn default() -> Self {
        Self {
            opaque_type: default_opaque_type(),
            header: true,
            translate_native_types: false,
            allowed_dunders: default_allowed_dunders(),
            exclude: Vec::new(),
        }
    }
}

/// `[modules."pkg.mod"]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleOverrides {
    /// Fully qualified types the module may reference (`"pkg.other.T"`)
    #[serde(default)]
    pub cimport_types: Vec<String>,

    /// Module-relative qualified name to type text
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl StubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load `pyxstub.toml` from the package root, if present
    pub fn find(root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: StubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if opaque_reference(&self.stubgen.opaque_type).is_none() {
            return Err(ConfigError::Invalid(format!(
                "opaque-type '{}' must be a builtin name or 'Any'",
                self.stubgen.opaque_type
            )));
        }

        for dunder in &self.stubgen.allowed_dunders {
            if !(dunder.starts_with("__") && dunder.ends_with("__")) {
                return Err(ConfigError::Invalid(format!(
                    "allowed-dunders entry '{}' is not a dunder name",
                    dunder
                )));
            }
        }

        for (module, overrides) in &self.modules {
            if module.is_empty() {
                return Err(ConfigError::Invalid("module path cannot be empty".to_string()));
            }
            for entry in &overrides.cimport_types {
                if TypeReference::from_qualified(entry, ResolvedVia::Override).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "cimport-types entry '{}' of module '{}' must be a qualified name like 'pkg.mod.Type'",
                        entry, module
                    )));
                }
            }
        }

        self.exclude_patterns()?;
        Ok(())
    }

    pub fn exclude_patterns(&self) -> Result<Vec<glob::Pattern>, ConfigError> {
        self.stubgen
            .exclude
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Register the override hooks that target `module`.
    ///
    /// Package-wide annotations are registered first and per-module ones
    /// second, so per-module entries win. A package-wide key belongs to the
    /// longest module path in `modules` that prefixes it. Registering a
    /// name twice reports a ConflictingOverride.
    pub fn apply_to(&self, module: &mut Module, modules: &[&str], diagnostics: &mut Diagnostics) {
        for (key, text) in &self.annotations {
            let owner = modules
                .iter()
                .filter(|path| key.starts_with(&format!("{}.", path)))
                .max_by_key(|path| path.len());
            if owner.map(|path| *path) != Some(module.path.as_str()) {
                continue;
            }
            let name = &key[module.path.len() + 1..];
            register(module, name, text, diagnostics);
        }

        let Some(overrides) = self.modules.get(&module.path) else {
            return;
        };
        for (name, text) in &overrides.annotations {
            register(module, name, text, diagnostics);
        }
        for entry in &overrides.cimport_types {
            if let Some(reference) = TypeReference::from_qualified(entry, ResolvedVia::Override) {
                if !module.explicit_cimport_types.contains(&reference) {
                    module.explicit_cimport_types.push(reference);
                }
            }
        }
    }
}

fn register(module: &mut Module, name: &str, text: &str, diagnostics: &mut Diagnostics) {
    if let Some(previous) = module
        .explicit_annotation_overrides
        .insert(name.to_string(), text.trim().to_string())
    {
        diagnostics.push(
            StubDiagnostic::new(
                DiagnosticKind::ConflictingOverride,
                &module.path,
                format!(
                    "Annotation override '{}' replaces an earlier override '{}'",
                    text.trim(),
                    previous
                ),
            )
            .with_name(name),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StubConfig::parse("").unwrap();
        assert_eq!(config.stubgen.opaque_type, "object");
        assert!(config.stubgen.header);
        assert!(!config.stubgen.translate_native_types);
        assert_eq!(config.stubgen.allowed_dunders.len(), 4);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[stubgen]
opaque-type = "Any"
translate-native-types = true
exclude = ["build/**"]

[modules."pkg.mod"]
cimport-types = ["pkg.other.T"]

[modules."pkg.mod".annotations]
"f" = "int"
"Cls.attr" = "list[int]"
"#;
        let config = StubConfig::parse(toml).unwrap();
        assert_eq!(config.stubgen.opaque_type, "Any");
        assert!(config.stubgen.translate_native_types);
        let overrides = &config.modules["pkg.mod"];
        assert_eq!(overrides.cimport_types, vec!["pkg.other.T"]);
        assert_eq!(overrides.annotations["Cls.attr"], "list[int]");
        let patterns = config.exclude_patterns().unwrap();
        assert!(patterns.iter().any(|p| p.matches_path(Path::new("build/x.pyx"))));
        assert!(!patterns.iter().any(|p| p.matches_path(Path::new("src/x.pyx"))));
    }

    #[test]
    fn test_invalid_cimport_type() {
        let toml = "[modules.\"m\"]\ncimport-types = [\"T\"]\n";
        assert!(matches!(StubConfig::parse(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_opaque_type_must_be_importable() {
        for opaque in ["object", "Any"] {
            let toml = format!("[stubgen]\nopaque-type = \"{}\"\n", opaque);
            assert!(StubConfig::parse(&toml).is_ok(), "{}", opaque);
        }
        for opaque in ["", "Unknown", "typing.Any"] {
            let toml = format!("[stubgen]\nopaque-type = \"{}\"\n", opaque);
            assert!(matches!(StubConfig::parse(&toml), Err(ConfigError::Invalid(_))), "{}", opaque);
        }
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let toml = "[stubgen]\nexclude = [\"[\"]\n";
        assert!(matches!(StubConfig::parse(toml), Err(ConfigError::Pattern { .. })));
    }

    #[test]
    fn test_module_entries_win_over_package_entries() {
        let toml = r#"
[annotations]
"pkg.mod.f" = "str"
"pkg.mod.sub.g" = "int"

[modules."pkg.mod".annotations]
"f" = "int"
"#;
        let config = StubConfig::parse(toml).unwrap();
        let mut module = Module::new("pkg.mod", "");
        let mut diagnostics = Diagnostics::new();
        config.apply_to(&mut module, &["pkg.mod", "pkg.mod.sub"], &mut diagnostics);

        assert_eq!(module.explicit_annotation_overrides["f"], "int");
        assert!(!module.explicit_annotation_overrides.contains_key("sub.g"));
        let diags: Vec<_> = diagnostics.iter().collect();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::ConflictingOverride);
        assert_eq!(diags[0].qualified_name.as_deref(), Some("f"));
    }

    #[test]
    fn test_cimport_types_applied() {
        let config = StubConfig::parse("[modules.\"a\"]\ncimport-types = [\"b.T\"]\n").unwrap();
        let mut module = Module::new("a", "");
        config.apply_to(&mut module, &["a", "b"], &mut Diagnostics::new());
        assert_eq!(module.explicit_cimport_types[0].name, "T");
        assert_eq!(module.explicit_cimport_types[0].module.as_deref(), Some("b"));
    }

    #[test]
    fn test_find_in_package_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StubConfig::find(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), "[stubgen]\nheader = false\n").unwrap();
        let config = StubConfig::find(dir.path()).unwrap().unwrap();
        assert!(!config.stubgen.header);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(StubConfig::from_file(&missing), Err(ConfigError::Io { .. })));
    }
}

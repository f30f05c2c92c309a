//! The closed set of decorators the stub generator understands.
//!
//! Every decorator falls into exactly one [`DecoratorClass`]. Preserved
//! classes carry a canonical spelling and, where the canonical name is not
//! a builtin, the import it needs.

use crate::stubgen::model::AccessorRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoratorClass {
    /// Structured record with a field-based constructor
    Dataclass,
    StaticMethod,
    ClassMethod,
    Overload,
    Final,
    AbstractMethod,
    /// `@property`, `@cached_property`
    Property,
    /// `@name.setter` and friends
    Accessor { property: String, role: AccessorRole },
    /// `@cython.cfunc`: the function is native and implementation-only
    NativeOnly,
    /// `@cython.ccall`: the function is native and public
    NativePublic,
    /// Compiler directives and runtime wrappers with no interface effect
    Neutral,
    Unknown,
}

/// Canonical rendering of a preserved decorator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonical {
    pub name: &'static str,
    /// Module to import `name` from; `None` for builtins
    pub module: Option<&'static str>,
}

const NEUTRAL: &[&str] = &[
    "wraps",
    "functools.wraps",
    "cache",
    "functools.cache",
    "lru_cache",
    "functools.lru_cache",
    "total_ordering",
    "functools.total_ordering",
];

impl DecoratorClass {
    pub fn recognize(name: &str) -> DecoratorClass {
        match name {
            "dataclass" | "dataclasses.dataclass" | "cython.dataclasses.dataclass" => {
                return DecoratorClass::Dataclass
            }
            "staticmethod" => return DecoratorClass::StaticMethod,
            "classmethod" => return DecoratorClass::ClassMethod,
            "overload" | "typing.overload" => return DecoratorClass::Overload,
            "final" | "typing.final" | "cython.final" => return DecoratorClass::Final,
            "abstractmethod" | "abc.abstractmethod" => return DecoratorClass::AbstractMethod,
            "property" | "cached_property" | "functools.cached_property" => {
                return DecoratorClass::Property
            }
            "cython.cfunc" => return DecoratorClass::NativeOnly,
            "cython.ccall" => return DecoratorClass::NativePublic,
            _ => {}
        }

        if let Some((property, attr)) = name.rsplit_once('.') {
            let role = match attr {
                "getter" => Some(AccessorRole::Getter),
                "setter" => Some(AccessorRole::Setter),
                "deleter" => Some(AccessorRole::Deleter),
                _ => None,
            };
            if let Some(role) = role {
                if !property.contains('.') {
                    return DecoratorClass::Accessor {
                        property: property.to_string(),
                        role,
                    };
                }
            }
        }

        if name == "cython" || name.starts_with("cython.") || NEUTRAL.contains(&name) {
            return DecoratorClass::Neutral;
        }
        DecoratorClass::Unknown
    }

    /// Whether the decorator is kept on the rendered declaration.
    pub fn is_preserved(&self) -> bool {
        self.canonical().is_some()
    }

    pub fn canonical(&self) -> Option<Canonical> {
        let (name, module) = match self {
            DecoratorClass::Dataclass => ("dataclass", Some("dataclasses")),
            DecoratorClass::StaticMethod => ("staticmethod", None),
            DecoratorClass::ClassMethod => ("classmethod", None),
            DecoratorClass::Overload => ("overload", Some("typing")),
            DecoratorClass::Final => ("final", Some("typing")),
            DecoratorClass::AbstractMethod => ("abstractmethod", Some("abc")),
            _ => return None,
        };
        Some(Canonical { name, module })
    }
}

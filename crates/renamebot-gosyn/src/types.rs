//! Semantic type model and the root/complete rendering rules.
//!
//! Rendering collapses every function signature to the literal token
//! `func()`, and unnamed struct/interface literals to `struct{...}` /
//! `interface{...}`. Types declared in the analyzed package render without a
//! qualifier; types from other packages render with their full import path.
//!
//! The **complete** string preserves pointer/slice/map structure
//! (`*[]myType`). The **root** string peels outer pointer and slice layers;
//! peeling stops at a map, which renders whole (`map[K]V`).

use std::fmt;

/// Predeclared type names. These are treated as unnamed: they never set the
/// named-type flag on an identifier record.
pub const PREDECLARED: &[&str] = &[
    "any",
    "bool",
    "byte",
    "comparable",
    "complex64",
    "complex128",
    "error",
    "float32",
    "float64",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "rune",
    "string",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
];

/// Whether a name belongs to the predeclared type set.
pub fn is_predeclared(name: &str) -> bool {
    PREDECLARED.contains(&name)
}

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Unresolvable or unknown; renders empty and is dropped by consumers.
    Invalid,
    /// A predeclared type (`int`, `string`, `error`, ...).
    Basic(&'static str),
    /// A named type. `pkg` is `None` for the analyzed package itself and the
    /// full import path for external packages.
    Named { pkg: Option<String>, name: String },
    /// A type parameter of a generic function or type.
    TypeParam(String),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    /// Fixed-size array; the length spelling is kept verbatim.
    Array { len: String, elem: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Chan(Box<Type>),
    /// Any function type.
    Func,
    /// An unnamed struct literal type.
    StructLit,
    /// An unnamed interface literal type.
    InterfaceLit,
}

impl Type {
    /// Render the full type string, preserving indirection.
    pub fn complete_string(&self) -> String {
        match self {
            Type::Invalid => String::new(),
            Type::Basic(name) => (*name).to_string(),
            Type::Named { pkg, name } => match pkg {
                Some(path) => format!("{path}.{name}"),
                None => name.clone(),
            },
            Type::TypeParam(name) => name.clone(),
            Type::Pointer(elem) => format!("*{}", elem.complete_string()),
            Type::Slice(elem) => format!("[]{}", elem.complete_string()),
            Type::Array { len, elem } => format!("[{len}]{}", elem.complete_string()),
            Type::Map { key, value } => {
                format!("map[{}]{}", key.complete_string(), value.complete_string())
            }
            Type::Chan(elem) => format!("chan {}", elem.complete_string()),
            Type::Func => "func()".to_string(),
            Type::StructLit => "struct{...}".to_string(),
            Type::InterfaceLit => "interface{...}".to_string(),
        }
    }

    /// The root of this type: outer pointer and slice layers peeled, with
    /// peeling stopping at a map.
    pub fn root(&self) -> &Type {
        let mut current = self;
        loop {
            match current {
                Type::Pointer(elem) | Type::Slice(elem) => current = elem,
                _ => return current,
            }
        }
    }

    /// Render the root type string.
    pub fn root_string(&self) -> String {
        self.root().complete_string()
    }

    /// Whether the outermost layer is a pointer.
    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// Whether the outermost layer is a slice.
    pub fn is_slice(&self) -> bool {
        matches!(self, Type::Slice(_))
    }

    /// Whether the outermost layer is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Type::Map { .. })
    }

    /// Whether the root is a named type declared in some package. The
    /// predeclared set is excluded by construction ([`Type::Basic`]).
    pub fn is_named(&self) -> bool {
        matches!(self.root(), Type::Named { .. })
    }

    /// Whether the root is a type parameter.
    pub fn is_type_param(&self) -> bool {
        matches!(self.root(), Type::TypeParam(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.complete_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Type {
        Type::Named {
            pkg: None,
            name: name.to_string(),
        }
    }

    #[test]
    fn complete_preserves_indirection() {
        let typ = Type::Pointer(Box::new(Type::Slice(Box::new(named("myType")))));
        assert_eq!(typ.complete_string(), "*[]myType");
    }

    #[test]
    fn root_peels_pointers_and_slices() {
        let typ = Type::Pointer(Box::new(Type::Slice(Box::new(Type::Pointer(Box::new(
            named("T"),
        ))))));
        assert_eq!(typ.root_string(), "T");
    }

    #[test]
    fn root_stops_at_map() {
        let typ = Type::Slice(Box::new(Type::Map {
            key: Box::new(Type::Basic("string")),
            value: Box::new(Type::Slice(Box::new(Type::Basic("int")))),
        }));
        assert_eq!(typ.root_string(), "map[string][]int");
    }

    #[test]
    fn func_collapses() {
        assert_eq!(Type::Func.complete_string(), "func()");
        assert_eq!(Type::Func.root_string(), "func()");
    }

    #[test]
    fn literal_collapses() {
        assert_eq!(Type::StructLit.complete_string(), "struct{...}");
        assert_eq!(Type::InterfaceLit.complete_string(), "interface{...}");
    }

    #[test]
    fn external_types_use_import_path() {
        let typ = Type::Named {
            pkg: Some("example.com/util".to_string()),
            name: "Buf".to_string(),
        };
        assert_eq!(typ.complete_string(), "example.com/util.Buf");
    }

    #[test]
    fn flags_are_shallow() {
        let typ = Type::Pointer(Box::new(Type::Slice(Box::new(Type::Basic("int")))));
        assert!(typ.is_ptr());
        assert!(!typ.is_slice());
        assert!(!typ.is_map());
    }

    #[test]
    fn named_flag_excludes_predeclared() {
        assert!(named("R").is_named());
        assert!(!Type::Basic("error").is_named());
        assert!(!Type::Basic("int").is_named());
        assert!(Type::Pointer(Box::new(named("R"))).is_named());
    }

    #[test]
    fn type_param_flag() {
        let typ = Type::Slice(Box::new(Type::TypeParam("T".to_string())));
        assert!(typ.is_type_param());
        assert!(!typ.is_named());
    }

    #[test]
    fn predeclared_set() {
        assert!(is_predeclared("error"));
        assert!(is_predeclared("byte"));
        assert!(!is_predeclared("R"));
    }
}

//! Structural type descriptors and the compatibility rules between them.
//!
//! Pointer, array and result types are composed from their element
//! types; there is no separate nominal entry for them. Aggregates are
//! referred to by name and resolved against the symbol table.

use std::fmt;

use crate::ast::TypeExpr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    /// `None` / `void`.
    None,
    Ptr(Box<Type>),
    Array(Box<Type>, usize),
    Result(Box<Type>, Box<Type>),
    /// Struct, enum or interface declared elsewhere.
    Named(String),
    /// Value produced by `range(..)`; only valid as a loop iterable.
    Range,
}

/// A resolved annotation: the type plus whether `Final[...]` wrapped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub ty: Type,
    pub immutable: bool,
}

impl Type {
    pub fn ptr(inner: Type) -> Type {
        Type::Ptr(Box::new(inner))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// `ptr[None]`, the untyped pointer returned by `malloc`.
    pub fn is_generic_pointer(&self) -> bool {
        matches!(self, Type::Ptr(inner) if **inner == Type::None)
    }

    /// Whether a value of type `value` may be stored into `self`.
    ///
    /// Widening is one-way: `bool` accepts `int`, never the reverse.
    pub fn accepts(&self, value: &Type) -> bool {
        if self == value {
            return true;
        }
        match (self, value) {
            (Type::Bool, Type::Int) => true,
            (Type::Ptr(_), Type::Ptr(_)) => self.is_generic_pointer() || value.is_generic_pointer(),
            // NULL
            (Type::Ptr(_), Type::None) => true,
            (Type::Ptr(elem), Type::Array(item, _)) => elem == item,
            _ => false,
        }
    }

    /// Result type of `+ - * / // %` on the two operand types.
    ///
    /// Falls back to `int` whenever nothing better is known.
    pub fn arithmetic(left: &Type, right: &Type) -> Type {
        if *left == Type::Float || *right == Type::Float {
            Type::Float
        } else {
            Type::Int
        }
    }

    /// Comparison operands must match in one direction or both be numeric.
    pub fn comparable(left: &Type, right: &Type) -> bool {
        left.accepts(right) || right.accepts(left) || (left.is_numeric() && right.is_numeric())
    }

    /// Element type of something that can be indexed.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(item, _) | Type::Ptr(item) => Some(item),
            _ => None,
        }
    }

    /// Strip one level of pointer, used for `self.field` on `ptr[Struct]`.
    pub fn pointee_or_self(&self) -> &Type {
        match self {
            Type::Ptr(inner) => inner,
            other => other,
        }
    }

    pub fn named(&self) -> Option<&str> {
        match self {
            Type::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Bool => f.write_str("bool"),
            Type::Str => f.write_str("str"),
            Type::None => f.write_str("None"),
            Type::Ptr(inner) => write!(f, "ptr[{inner}]"),
            Type::Array(inner, size) => write!(f, "array[{inner}, {size}]"),
            Type::Result(ok, err) => write!(f, "Result[{ok}, {err}]"),
            Type::Named(name) => f.write_str(name),
            Type::Range => f.write_str("range"),
        }
    }
}

/// Resolve an annotation, peeling an outer `Final[...]`.
pub fn resolve_annotation(expr: &TypeExpr) -> Result<Annotation, String> {
    match expr {
        TypeExpr::Generic { name, args } if name == "Final" => match args.as_slice() {
            [inner] => Ok(Annotation {
                ty: resolve_type(inner)?,
                immutable: true,
            }),
            _ => Err("Final[...] takes exactly one type".to_string()),
        },
        other => Ok(Annotation {
            ty: resolve_type(other)?,
            immutable: false,
        }),
    }
}

/// Resolve a syntactic annotation into a structural type.
///
/// Unknown names become `Type::Named`; whether they refer to a real
/// aggregate is checked where the name is used.
pub fn resolve_type(expr: &TypeExpr) -> Result<Type, String> {
    match expr {
        TypeExpr::Name(name) => match name.as_str() {
            "int" => Ok(Type::Int),
            "float" => Ok(Type::Float),
            "bool" => Ok(Type::Bool),
            "str" => Ok(Type::Str),
            "None" | "void" => Ok(Type::None),
            "ptr" | "array" | "Result" | "Final" => {
                Err(format!("type '{name}' needs type arguments"))
            }
            _ => Ok(Type::Named(name.clone())),
        },
        TypeExpr::Generic { name, args } => match (name.as_str(), args.as_slice()) {
            ("ptr", [inner]) => Ok(Type::ptr(resolve_type(inner)?)),
            ("array", [inner, TypeExpr::Size(size)]) => {
                if *size == 0 {
                    return Err("array size must be positive".to_string());
                }
                Ok(Type::Array(Box::new(resolve_type(inner)?), *size))
            }
            ("Result", [ok, err]) => Ok(Type::Result(
                Box::new(resolve_type(ok)?),
                Box::new(resolve_type(err)?),
            )),
            ("Final", _) => Err("Final[...] is only allowed as the outermost annotation".to_string()),
            _ => Err(format!("malformed type '{expr}'")),
        },
        TypeExpr::Tuple(items) => match items.as_slice() {
            [ok, err] => Ok(Type::Result(
                Box::new(resolve_type(ok)?),
                Box::new(resolve_type(err)?),
            )),
            _ => Err(format!("tuple type '{expr}' must have exactly two elements")),
        },
        TypeExpr::Size(size) => Err(format!("'{size}' is not a type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> TypeExpr {
        TypeExpr::Name(text.to_string())
    }

    #[test]
    fn bool_accepts_int_but_not_the_reverse() {
        assert!(Type::Bool.accepts(&Type::Int));
        assert!(!Type::Int.accepts(&Type::Bool));
    }

    #[test]
    fn identical_types_are_compatible() {
        let ty = Type::ptr(Type::Named("Node".to_string()));
        assert!(ty.accepts(&ty.clone()));
        assert!(!Type::Int.accepts(&Type::Float));
        assert!(!Type::Float.accepts(&Type::Int));
    }

    #[test]
    fn generic_pointer_converts_both_ways() {
        let generic = Type::ptr(Type::None);
        let ints = Type::ptr(Type::Int);
        let floats = Type::ptr(Type::Float);
        assert!(generic.accepts(&ints));
        assert!(floats.accepts(&generic));
        assert!(!floats.accepts(&ints));
        assert!(ints.accepts(&Type::None));
    }

    #[test]
    fn arrays_decay_to_matching_pointers() {
        let array = Type::Array(Box::new(Type::Int), 5);
        assert!(Type::ptr(Type::Int).accepts(&array));
        assert!(!Type::ptr(Type::Float).accepts(&array));
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        assert_eq!(Type::arithmetic(&Type::Int, &Type::Float), Type::Float);
        assert_eq!(Type::arithmetic(&Type::Int, &Type::Int), Type::Int);
        assert_eq!(Type::arithmetic(&Type::Str, &Type::Int), Type::Int);
    }

    #[test]
    fn comparison_accepts_mixed_numbers() {
        assert!(Type::comparable(&Type::Int, &Type::Float));
        assert!(Type::comparable(&Type::Bool, &Type::Int));
        assert!(!Type::comparable(&Type::Str, &Type::Int));
    }

    #[test]
    fn resolves_structural_annotations() {
        let array = TypeExpr::Generic {
            name: "array".to_string(),
            args: vec![name("float"), TypeExpr::Size(3)],
        };
        assert_eq!(resolve_type(&array).expect("array"), Type::Array(Box::new(Type::Float), 3));

        let tuple = TypeExpr::Tuple(vec![name("int"), name("str")]);
        assert_eq!(
            resolve_type(&tuple).expect("tuple"),
            Type::Result(Box::new(Type::Int), Box::new(Type::Str))
        );

        let fin = TypeExpr::Generic {
            name: "Final".to_string(),
            args: vec![name("int")],
        };
        let annotation = resolve_annotation(&fin).expect("final");
        assert!(annotation.immutable);
        assert_eq!(annotation.ty, Type::Int);
    }

    #[test]
    fn rejects_malformed_annotations() {
        assert!(resolve_type(&name("ptr")).is_err());
        let nested_final = TypeExpr::Generic {
            name: "ptr".to_string(),
            args: vec![TypeExpr::Generic {
                name: "Final".to_string(),
                args: vec![name("int")],
            }],
        };
        assert!(resolve_type(&nested_final).is_err());
    }

    #[test]
    fn displays_source_spelling() {
        let ty = Type::Result(
            Box::new(Type::ptr(Type::Named("Node".to_string()))),
            Box::new(Type::Str),
        );
        assert_eq!(ty.to_string(), "Result[ptr[Node], str]");
    }
}

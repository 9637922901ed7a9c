//! Builtin functions visible at the Pyrinas level.
//!
//! This module only describes the builtins. The analyzer decides how
//! each kind is typed and the C backend decides how it is lowered;
//! the `Unwrap`/`UnwrapOr`/`Expect`/`IsOk`/`IsErr` kinds are plain
//! calls into the runtime library.

use crate::types::Type;

/// Slot of the runtime `Value` union that carries a Result payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Int,
    Float,
    Str,
    Ptr,
}

impl Payload {
    pub fn ty(self) -> Type {
        match self {
            Payload::Int => Type::Int,
            Payload::Float => Type::Float,
            Payload::Str => Type::Str,
            Payload::Ptr => Type::ptr(Type::None),
        }
    }

    /// Field name in the runtime `Value` union.
    pub fn slot(self) -> &'static str {
        match self {
            Payload::Int => "int_val",
            Payload::Float => "float_val",
            Payload::Str => "str_val",
            Payload::Ptr => "ptr_val",
        }
    }

    /// Slot for a primitive or pointer type; aggregates have none.
    pub fn for_type(ty: &Type) -> Option<Payload> {
        match ty {
            Type::Int | Type::Bool => Some(Payload::Int),
            Type::Float => Some(Payload::Float),
            Type::Str => Some(Payload::Str),
            Type::Ptr(_) => Some(Payload::Ptr),
            _ => None,
        }
    }
}

/// Kind of builtin, used to decide how a call is checked and lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Prints one value followed by a newline.
    Print,
    /// Integer range; only valid as a `for` iterable.
    Range,
    /// Address of an lvalue.
    Addr,
    /// Value behind a pointer.
    Deref,
    /// Store through a pointer: `assign(p, v)`.
    Store,
    Malloc,
    Free,
    SizeOf,
    IntCast,
    FloatCast,
    /// Successful Result constructor.
    Ok,
    /// Failed Result constructor.
    Err,
    IsOk,
    IsErr,
    Unwrap(Payload),
    UnwrapOr(Payload),
    Expect(Payload),
}

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name at the Pyrinas level (e.g., `print`).
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub kind: BuiltinKind,
}

impl BuiltinDescriptor {
    pub fn accepts_arity(&self, count: usize) -> bool {
        (self.min_args..=self.max_args).contains(&count)
    }

    pub fn arity_text(&self) -> String {
        if self.min_args == self.max_args {
            let plural = if self.min_args == 1 { "" } else { "s" };
            format!("exactly {} argument{plural}", self.min_args)
        } else {
            format!("{} to {} arguments", self.min_args, self.max_args)
        }
    }

    /// Builtins implemented by the runtime library rather than inline C.
    pub fn is_runtime_helper(&self) -> bool {
        matches!(
            self.kind,
            BuiltinKind::IsOk
                | BuiltinKind::IsErr
                | BuiltinKind::Unwrap(_)
                | BuiltinKind::UnwrapOr(_)
                | BuiltinKind::Expect(_)
        )
    }
}

const fn builtin(name: &'static str, args: usize, kind: BuiltinKind) -> BuiltinDescriptor {
    BuiltinDescriptor {
        name,
        min_args: args,
        max_args: args,
        kind,
    }
}

/// The complete list of builtins known to the core.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    builtin("print", 1, BuiltinKind::Print),
    BuiltinDescriptor {
        name: "range",
        min_args: 1,
        max_args: 2,
        kind: BuiltinKind::Range,
    },
    builtin("addr", 1, BuiltinKind::Addr),
    builtin("deref", 1, BuiltinKind::Deref),
    builtin("assign", 2, BuiltinKind::Store),
    builtin("malloc", 1, BuiltinKind::Malloc),
    builtin("free", 1, BuiltinKind::Free),
    builtin("sizeof", 1, BuiltinKind::SizeOf),
    builtin("int", 1, BuiltinKind::IntCast),
    builtin("float", 1, BuiltinKind::FloatCast),
    builtin("Ok", 1, BuiltinKind::Ok),
    builtin("Err", 1, BuiltinKind::Err),
    builtin("is_ok", 1, BuiltinKind::IsOk),
    builtin("is_err", 1, BuiltinKind::IsErr),
    builtin("unwrap_int", 1, BuiltinKind::Unwrap(Payload::Int)),
    builtin("unwrap_float", 1, BuiltinKind::Unwrap(Payload::Float)),
    builtin("unwrap_str", 1, BuiltinKind::Unwrap(Payload::Str)),
    builtin("unwrap_ptr", 1, BuiltinKind::Unwrap(Payload::Ptr)),
    builtin("unwrap_or_int", 2, BuiltinKind::UnwrapOr(Payload::Int)),
    builtin("unwrap_or_float", 2, BuiltinKind::UnwrapOr(Payload::Float)),
    builtin("unwrap_or_str", 2, BuiltinKind::UnwrapOr(Payload::Str)),
    builtin("unwrap_or_ptr", 2, BuiltinKind::UnwrapOr(Payload::Ptr)),
    builtin("expect_int", 2, BuiltinKind::Expect(Payload::Int)),
    builtin("expect_float", 2, BuiltinKind::Expect(Payload::Float)),
    builtin("expect_str", 2, BuiltinKind::Expect(Payload::Str)),
    builtin("expect_ptr", 2, BuiltinKind::Expect(Payload::Ptr)),
];

/// Look up a builtin by its Pyrinas-level name.
///
/// The search is linear over `BUILTINS` because the table is small.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|b| b.name == name)
}

//! Catalog of C library functions importable as `c.<header>` modules.
//!
//! Each entry becomes a foreign function symbol; generated code calls
//! it by name and includes the owning header.

use anyhow::{Result, bail};
use pyrinas_core::symbols::{ForeignOrigin, ModuleFragment, Symbol};
use pyrinas_core::types::Type;

/// Prefix of import paths that name C headers.
pub const FOREIGN_ROOT: &str = "c";

struct ForeignHeader {
    module: &'static str,
    header: &'static str,
    library: Option<&'static str>,
    functions: &'static [(&'static str, &'static [Ty], Ty)],
}

/// Compact spelling of the types used in the catalog.
#[derive(Clone, Copy)]
enum Ty {
    Int,
    Float,
    Str,
    Void,
}

impl Ty {
    fn resolve(self) -> Type {
        match self {
            Ty::Int => Type::Int,
            Ty::Float => Type::Float,
            Ty::Str => Type::Str,
            Ty::Void => Type::None,
        }
    }
}

use Ty::{Float, Int, Str, Void};

const HEADERS: &[ForeignHeader] = &[
    ForeignHeader {
        module: "math",
        header: "math.h",
        library: Some("m"),
        functions: &[
            ("sqrt", &[Float], Float),
            ("pow", &[Float, Float], Float),
            ("sin", &[Float], Float),
            ("cos", &[Float], Float),
            ("tan", &[Float], Float),
            ("atan2", &[Float, Float], Float),
            ("exp", &[Float], Float),
            ("log", &[Float], Float),
            ("fabs", &[Float], Float),
            ("floor", &[Float], Float),
            ("ceil", &[Float], Float),
            ("fmod", &[Float, Float], Float),
        ],
    },
    ForeignHeader {
        module: "string",
        header: "string.h",
        library: None,
        functions: &[
            ("strlen", &[Str], Int),
            ("strcmp", &[Str, Str], Int),
            ("strncmp", &[Str, Str, Int], Int),
            ("strcpy", &[Str, Str], Str),
            ("strcat", &[Str, Str], Str),
        ],
    },
    ForeignHeader {
        module: "stdlib",
        header: "stdlib.h",
        library: None,
        functions: &[
            ("abs", &[Int], Int),
            ("atoi", &[Str], Int),
            ("atof", &[Str], Float),
            ("rand", &[], Int),
            ("srand", &[Int], Void),
            ("exit", &[Int], Void),
        ],
    },
];

pub fn is_foreign(module: &[String]) -> bool {
    module.first().is_some_and(|root| root == FOREIGN_ROOT)
}

/// Build the fragment for an import path such as `["c", "math"]`.
pub fn fragment(module: &[String]) -> Result<ModuleFragment> {
    let path = module.join(".");
    let [_, name] = module else {
        bail!("foreign module '{path}' must have the form c.<header>");
    };
    let Some(header) = HEADERS.iter().find(|h| h.module == name) else {
        bail!("unknown C header module '{path}'");
    };

    let origin = ForeignOrigin {
        header: header.header.to_string(),
        library: header.library.map(str::to_string),
    };
    let symbols = header
        .functions
        .iter()
        .map(|(name, params, returns)| {
            Symbol::foreign_function(
                *name,
                params.iter().map(|ty| ty.resolve()).collect(),
                returns.resolve(),
                origin.clone(),
            )
        })
        .collect();
    Ok(ModuleFragment::new(path, symbols))
}

//! Core compiler pipeline for the Pyrinas language.
//!
//! Pyrinas is a statically typed, indentation-delimited language that
//! compiles to C. The pipeline is:
//!
//!   source .pyr
//!     -> lexer      (tokens with INDENT/DEDENT)
//!     -> parser     (AST)
//!     -> typecheck  (symbol table, two-pass analysis)
//!     -> codegen_c  (one C translation unit)
//!
//! The crate performs no file or process I/O. Resolving imports,
//! writing files and invoking a C compiler belong to the CLI, which
//! hands resolved imports back in as [`symbols::ModuleFragment`]s.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, symbols, type checking
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod typecheck;

// ---------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------

pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: code generation and compiler orchestration
// ---------------------------------------------------------------------

pub mod codegen_c;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{
    CompilationArtifact, CompileOptions, Dumps, UnitKind, collect_imports, compile_c,
};
pub use error::{CoreError, Stage};
pub use symbols::{ForeignOrigin, ModuleFragment, Symbol, SymbolOrigin};
pub use types::Type;

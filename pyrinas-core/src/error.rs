use std::fmt;

use thiserror::Error;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lex,
    Parse,
    Semantic,
    CodeGen,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Semantic => "semantic",
            Stage::CodeGen => "codegen",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    #[error("lex error at {line}:{column}: {message}")]
    LexError {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("parse error at {line}:{column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("semantic error at line {line}: {message}")]
    SemanticError { line: usize, message: String },
    #[error("codegen error: {0}")]
    CodeGenError(String),
}

impl CoreError {
    pub fn stage(&self) -> Stage {
        match self {
            CoreError::LexError { .. } => Stage::Lex,
            CoreError::ParseError { .. } => Stage::Parse,
            CoreError::SemanticError { .. } => Stage::Semantic,
            CoreError::CodeGenError(_) => Stage::CodeGen,
        }
    }

    /// The bare human-readable message without position or stage prefix.
    pub fn message(&self) -> &str {
        match self {
            CoreError::LexError { message, .. }
            | CoreError::ParseError { message, .. }
            | CoreError::SemanticError { message, .. } => message,
            CoreError::CodeGenError(message) => message,
        }
    }
}

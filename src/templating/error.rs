//! Error types for template parsing and rendering.
//!
//! Parsing errors carry a source location. Render errors are raised synchronously
//! from `CompiledTemplate::render` and are never swallowed by the engine.

use thiserror::Error;

/// A syntax error in template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    /// 1-indexed line of the offending tag.
    pub line: usize,
    /// 1-indexed column of the offending tag.
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Errors raised while rendering a compiled template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// An expression with arguments named a helper that is not registered.
    #[error("Missing helper: '{name}'")]
    MissingHelper {
        name: String,
        suggestions: Vec<String>,
    },

    /// A partial could not be found at render time and no fallback block was given.
    #[error("The partial '{name}' could not be found")]
    MissingPartial { name: String },

    /// Strict mode only: a variable lookup produced nothing.
    #[error("Template variable not found: '{path}'")]
    VariableNotFound {
        path: String,
        suggestions: Vec<String>,
    },

    /// A helper returned an error.
    #[error("Helper '{helper}' failed: {message}")]
    HelperFailed { helper: String, message: String },

    /// Partial invocations nested deeper than the configured limit.
    #[error("Partial recursion exceeded {max_depth} levels while rendering '{partial}'")]
    RecursionLimit { partial: String, max_depth: usize },
}

impl RenderError {
    /// Suggestions attached to the error, if any.
    pub fn suggestions(&self) -> &[String] {
        match self {
            RenderError::MissingHelper {
                suggestions,
                ..
            }
            | RenderError::VariableNotFound {
                suggestions,
                ..
            } => suggestions,
            _ => &[],
        }
    }
}

/// Error returned by helper functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HelperError(pub String);

impl HelperError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

//! Error handling for the hbscope command line.
//!
//! Library code returns precise error types ([`CompileError`], [`RenderError`],
//! [`ScopeError`], [`FetchError`], [`ParseError`]). The binary works with
//! [`anyhow::Error`] and converts whatever reaches `main` into an [`ErrorContext`]
//! through [`user_friendly_error`], which adds details and an actionable suggestion.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hbscope::core::{HbscopeError, user_friendly_error};
//!
//! let error = HbscopeError::TemplateNotFound {
//!     path: "page.hbs".to_string(),
//! };
//! let context = user_friendly_error(anyhow::Error::from(error));
//! context.display(); // Colored error with suggestion on stderr
//! ```

use std::fmt;

use colored::Colorize;
use thiserror::Error;

use crate::scope::{CompileError, FetchError, ScopeError};
use crate::templating::{ParseError, RenderError};

/// Errors surfaced to users of the `hbscope` binary.
#[derive(Error, Debug, Clone)]
pub enum HbscopeError {
    #[error("Template file not found: {path}")]
    TemplateNotFound { path: String },

    #[error("File system error: {operation} failed for {path}")]
    FileSystemError { operation: String, path: String },

    #[error("Permission denied: {operation} on {path}")]
    PermissionDenied { operation: String, path: String },

    #[error("Invalid configuration in {file}: {reason}")]
    ConfigParseError { file: String, reason: String },

    #[error("Invalid --partial argument '{value}': expected NAME=FILE")]
    InvalidPartialArgument { value: String },

    #[error("Invalid JSON in {path}: {reason}")]
    InvalidData { path: String, reason: String },

    #[error("{failed} of {total} template(s) failed to compile")]
    CheckFailed { failed: usize, total: usize },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("{message}")]
    Other { message: String },
}

/// An error plus optional details and a suggestion, printed by [`display`](Self::display).
#[derive(Debug)]
pub struct ErrorContext {
    pub error: HbscopeError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: HbscopeError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Converts any error into an [`ErrorContext`] with details and a suggestion.
///
/// Recognizes [`HbscopeError`], the library errors, [`std::io::Error`],
/// [`toml::de::Error`] and [`serde_json::Error`]; anything else is reported with
/// its cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(e) = error.downcast_ref::<HbscopeError>() {
        return create_error_context(e.clone());
    }
    if let Some(e) = error.downcast_ref::<CompileError>() {
        return create_error_context(HbscopeError::Compile(e.clone()));
    }
    if let Some(e) = error.downcast_ref::<RenderError>() {
        return create_error_context(HbscopeError::Render(e.clone()));
    }
    if let Some(e) = error.downcast_ref::<ScopeError>() {
        return create_error_context(HbscopeError::Scope(e.clone()));
    }
    if let Some(e) = error.downcast_ref::<ParseError>() {
        return create_error_context(HbscopeError::Compile(CompileError::Syntax(e.clone())));
    }

    if let Some(e) = error.downcast_ref::<FetchError>() {
        return ErrorContext::new(HbscopeError::Other {
            message: e.to_string(),
        })
        .with_suggestion("Check the remote template directory configured in hbscope.toml or HBSCOPE_TEMPLATE_DIR");
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(HbscopeError::PermissionDenied {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check file ownership and permissions")
                .with_details("hbscope could not read or write one of the files involved");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(HbscopeError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct")
                .with_details(format!("{error:#}"));
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(HbscopeError::ConfigParseError {
            file: "hbscope.toml".to_string(),
            reason: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of the configuration file. Verify quotes, brackets and table names");
    }

    if let Some(json_error) = error.downcast_ref::<serde_json::Error>() {
        return ErrorContext::new(HbscopeError::InvalidData {
            path: "input".to_string(),
            reason: json_error.to_string(),
        })
        .with_suggestion("Data and captured context files must contain valid JSON");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(HbscopeError::Other { message })
}

fn create_error_context(error: HbscopeError) -> ErrorContext {
    match &error {
        HbscopeError::TemplateNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Check the template path. Use '-' to read the template from stdin"),

        HbscopeError::FileSystemError { .. } | HbscopeError::PermissionDenied { .. } => {
            ErrorContext::new(error).with_suggestion("Check that the path exists and is accessible")
        }

        HbscopeError::ConfigParseError { file, .. } => {
            let suggestion = format!(
                "Check the TOML syntax in {file}. Known keys: strict, escape_html, [remote], [partials]"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        HbscopeError::InvalidPartialArgument { .. } => ErrorContext::new(error)
            .with_suggestion("Pass partials as --partial header=templates/header.hbs"),

        HbscopeError::InvalidData { .. } => {
            ErrorContext::new(error).with_suggestion("Data and captured context files must contain valid JSON")
        }

        HbscopeError::CheckFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'hbscope check' with --verbose to see the resolution of each template"),

        HbscopeError::Compile(compile) => {
            let details = compile.format_with_context();
            let suggestion = match compile {
                CompileError::Syntax(_) | CompileError::PartialSyntax { .. } => {
                    "Check for unclosed blocks, mismatched closing tags and unbalanced quotes"
                }
                CompileError::PartialFetch { .. } => {
                    "Register the partial with --partial NAME=FILE, add it to [partials], or place it under remote.template_dir"
                }
            };
            ErrorContext::new(error.clone())
                .with_details(details)
                .with_suggestion(suggestion)
        }

        HbscopeError::Render(render) => {
            let suggestion = match render {
                RenderError::MissingHelper { suggestions, .. }
                | RenderError::VariableNotFound { suggestions, .. }
                    if !suggestions.is_empty() =>
                {
                    format!("Did you mean: {}?", suggestions.join(", "))
                }
                RenderError::MissingHelper { .. } => {
                    "Register the helper on the scope before rendering".to_string()
                }
                RenderError::VariableNotFound { .. } => {
                    "Add the variable to the data file or disable strict mode".to_string()
                }
                RenderError::MissingPartial { name } => format!(
                    "Register '{name}' as a partial, or use {{{{#> {name}}}}}fallback{{{{/{name}}}}} to render a fallback"
                ),
                RenderError::RecursionLimit { .. } => {
                    "Check that recursive partials stop when the data runs out".to_string()
                }
                RenderError::HelperFailed { .. } => "Check the helper's arguments".to_string(),
            };
            ErrorContext::new(error.clone()).with_suggestion(suggestion)
        }

        HbscopeError::Scope(ScopeError::DuplicatePartial { name }) => {
            let suggestion = format!("Register '{name}' only once");
            ErrorContext::new(error.clone()).with_suggestion(suggestion)
        }

        HbscopeError::Scope(ScopeError::PartialSyntax { .. }) => ErrorContext::new(error)
            .with_suggestion("Fix the partial's syntax; partials are parsed when they are registered"),

        HbscopeError::Other { .. } => ErrorContext::new(error),
    }
}

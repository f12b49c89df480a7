//! Errors raised while building scopes and compiling templates.

use std::sync::Arc;

use thiserror::Error;

use super::cache::RemoteFailure;
use super::fetcher::FetchError;
use crate::templating::ParseError;

/// Failure of one `compile()` call. Resolution failures never poison the scope:
/// nothing is cached for the failing name.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// The root template does not parse.
    #[error("Template syntax error: {0}")]
    Syntax(#[from] ParseError),

    /// A remote partial could not be fetched.
    #[error("Failed to resolve partial '{reference}'")]
    PartialFetch {
        reference: String,
        /// Referrers from the root template down to `reference`.
        chain: Vec<String>,
        #[source]
        source: Arc<FetchError>,
    },

    /// A partial was found but its source does not parse.
    #[error("Syntax error in partial '{reference}'")]
    PartialSyntax {
        reference: String,
        chain: Vec<String>,
        #[source]
        source: ParseError,
    },
}

impl CompileError {
    pub(crate) fn from_remote(reference: &str, chain: Vec<String>, failure: RemoteFailure) -> Self {
        match failure {
            RemoteFailure::Fetch(source) => CompileError::PartialFetch {
                reference: reference.to_string(),
                chain,
                source,
            },
            RemoteFailure::Syntax(source) => CompileError::PartialSyntax {
                reference: reference.to_string(),
                chain,
                source,
            },
        }
    }

    /// The partial that failed, if the error is not in the root template.
    pub fn reference(&self) -> Option<&str> {
        match self {
            CompileError::Syntax(_) => None,
            CompileError::PartialFetch { reference, .. }
            | CompileError::PartialSyntax { reference, .. } => Some(reference),
        }
    }

    pub fn chain(&self) -> &[String] {
        match self {
            CompileError::Syntax(_) => &[],
            CompileError::PartialFetch { chain, .. } | CompileError::PartialSyntax { chain, .. } => chain,
        }
    }

    /// Multi-line report with the dependency chain and a hint.
    pub fn format_with_context(&self) -> String {
        let mut msg = String::new();
        match self {
            CompileError::Syntax(e) => {
                msg.push_str("ERROR: Template Syntax Error\n\n");
                msg.push_str(&format!("{}\n", e.message));
                msg.push_str(&format!("Line: {}, column: {}\n", e.line, e.column));
            }
            CompileError::PartialFetch { reference, chain, source } => {
                msg.push_str("ERROR: Partial Could Not Be Resolved\n\n");
                msg.push_str(&format!("Partial: {reference}\n"));
                msg.push_str(&format!("Reason: {source}\n\n"));
                push_chain(&mut msg, chain);
                msg.push_str(
                    "Register the partial locally or make it available to the remote fetcher.\n",
                );
            }
            CompileError::PartialSyntax { reference, chain, source } => {
                msg.push_str("ERROR: Syntax Error In Partial\n\n");
                msg.push_str(&format!("Partial: {reference}\n"));
                msg.push_str(&format!("{}\n", source.message));
                msg.push_str(&format!("Line: {}, column: {}\n\n", source.line, source.column));
                push_chain(&mut msg, chain);
            }
        }
        msg
    }
}

/// Failure to register partials on a scope or builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("Partial '{name}' is already registered")]
    DuplicatePartial { name: String },

    #[error("Partial '{name}' has a syntax error: {source}")]
    PartialSyntax {
        name: String,
        #[source]
        source: ParseError,
    },
}

fn push_chain(msg: &mut String, chain: &[String]) {
    if chain.is_empty() {
        return;
    }
    msg.push_str("Dependency chain:\n");
    for (i, name) in chain.iter().enumerate() {
        let indent = "  ".repeat(i);
        let arrow = if i > 0 { "└─ " } else { "" };
        let marker = if i == chain.len() - 1 { "  <- error occurred here" } else { "" };
        msg.push_str(&format!("{indent}{arrow}{name}{marker}\n"));
    }
    msg.push('\n');
}

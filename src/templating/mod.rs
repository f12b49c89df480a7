//! Mustache-style template engine.
//!
//! Templates are parsed once into an immutable AST ([`ParsedTemplate`]) and bound
//! to a table of partials and a helper registry to form a [`CompiledTemplate`].
//! Rendering is synchronous, pure, and never suspends; resolving partials
//! asynchronously is the job of [`crate::scope::TemplateScope`].
//!
//! # Supported Syntax
//!
//! - Interpolation: `{{name}}` (HTML-escaped), `{{{name}}}` / `{{& name}}` (raw)
//! - Paths: `a.b`, `a/b`, `this`, `./a`, `../a`, `[odd key]`, `@index`, `@key`,
//!   `@first`, `@last`, `@root`, `@../index`
//! - Helpers with positional args, `key=value` hash args and `(subexpressions)`
//! - Blocks: `{{#if}}`, `{{#unless}}`, `{{#each}}`, `{{#with}}`, `{{else}}`,
//!   `{{else if ...}}`, `{{^inverse}}`, block params `as |item index|`
//! - Partials: `{{> name}}`, `{{> name ctx key=value}}`, `{{#> name}}fallback{{/name}}`,
//!   `{{> @partial-block}}`, `{{#*inline "name"}}...{{/inline}}`
//! - Raw blocks: `{{{{raw}}}}...{{{{/raw}}}}` and the capture block
//!   `{{{{capture key=value}}}}...{{{{/capture}}}}`
//! - Comments `{{! }}` / `{{!-- --}}`, escaped `\{{`, whitespace control `{{~ ~}}`
//!
//! # Capture Protocol
//!
//! See [`capture`] for how a render pass with a [`ContextCapturer`] produces
//! template source plus a [`CapturedContext`] that a later pass restores.
//!
//! # Examples
//!
//! ```
//! use hbscope::templating::compile_standalone;
//! use serde_json::json;
//!
//! let template = compile_standalone("Hello {{name}}!").unwrap();
//! assert_eq!(template.render(&json!({"name": "World"})).unwrap(), "Hello World!");
//! ```

pub mod ast;
pub mod capture;
pub mod compiled;
pub mod error;
pub mod helpers;
pub mod lexer;
pub mod parser;
mod renderer;
pub mod value;


use std::sync::Arc;

pub use capture::{CaptureKey, CaptureScopeId, CapturedContext, ContextCapturer};
pub use compiled::{CompiledTemplate, PartialTable, RenderOptions, RenderSettings};
pub use error::{HelperError, ParseError, RenderError};
pub use helpers::{HelperArgs, HelperFn, HelperRegistry};
pub use parser::{ParsedTemplate, parse};

/// Compiles a template that has no partials, using the default helpers.
///
/// Any `{{> partial}}` reference fails at render time unless it is defined inline.
pub fn compile_standalone(source: &str) -> Result<CompiledTemplate, ParseError> {
    let template = parse(source)?;
    Ok(CompiledTemplate::new(
        Arc::new(template),
        Arc::new(PartialTable::new()),
        Arc::new(HelperRegistry::with_defaults()),
        RenderSettings::default(),
    ))
}

//! hbscope - template scopes for mustache-style templates
//!
//! A [`TemplateScope`](scope::TemplateScope) compiles template source into a pure,
//! synchronous renderer. Partials may be registered locally, inherited from the
//! scope a scope was cloned from, or fetched lazily by identifier through a
//! [`RemoteFetcher`](scope::RemoteFetcher). Compilation is asynchronous; each
//! remote identifier is fetched at most once per scope, however many templates
//! reference it and however many compilations run concurrently.
//!
//! Rendering supports a two-pass capture protocol: a first pass with a
//! [`ContextCapturer`](templating::ContextCapturer) turns `{{{{capture}}}}` blocks
//! into template source and records the bindings in scope at each block; a second,
//! independent pass restores them from the resulting
//! [`CapturedContext`](templating::CapturedContext), per iteration.
//!
//! # Core Modules
//!
//! - [`templating`] - Lexer, parser, renderer, helpers and the capture protocol
//! - [`scope`] - Partial stores, remote fetchers, the remote cache and resolution
//! - [`config`] - `hbscope.toml` configuration for the binary
//! - [`core`] - User-facing errors and their presentation
//! - [`cli`] - The `render`, `deps` and `check` commands
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hbscope::scope::{InMemoryFetcher, TemplateScope};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let fetcher = InMemoryFetcher::new()
//!     .with_template("zoo:elephant", "elephant and {{> zoo:lion}}")
//!     .with_template("zoo:mouse", "mouse and {{> zoo:lion}}")
//!     .with_template("zoo:lion", "lion!");
//! let scope = TemplateScope::global().clone().with_fetcher(Arc::new(fetcher));
//!
//! let template = scope.compile("Diamond: {{> zoo:elephant}}, {{> zoo:mouse}}").await?;
//! assert_eq!(
//!     template.render(&json!({}))?,
//!     "Diamond: elephant and lion!, mouse and lion!"
//! );
//! assert_eq!(scope.cache_stats().misses, 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Render a template with data and local partials
//! hbscope render page.hbs --data page.json --partial header=header.hbs
//!
//! # Two-pass rendering
//! hbscope render page.hbs --data page.json -o staged.hbs --capture-out ctx.json
//! hbscope render staged.hbs --parent-context ctx.json
//!
//! # Inspect and validate
//! hbscope deps page.hbs
//! hbscope check templates/
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod scope;
pub mod templating;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

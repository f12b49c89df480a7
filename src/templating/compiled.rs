//! The executable result of compiling a template.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::capture::{CapturedContext, ContextCapturer};
use super::error::RenderError;
use super::helpers::HelperRegistry;
use super::parser::ParsedTemplate;
use super::renderer::Renderer;

/// Partials visible to a compiled template, keyed by the name used to reference them.
pub type PartialTable = BTreeMap<String, Arc<ParsedTemplate>>;

/// Flags fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    /// Fail on missing variables instead of rendering nothing.
    pub strict: bool,
    /// HTML-escape `{{ }}` output.
    pub escape_html: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            strict: false,
            escape_html: true,
        }
    }
}

/// Optional per-invocation inputs for the capture protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    pub capturer: Option<&'a ContextCapturer>,
    pub parent_context: Option<&'a CapturedContext>,
}

impl<'a> RenderOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capturer(mut self, capturer: &'a ContextCapturer) -> Self {
        self.capturer = Some(capturer);
        self
    }

    pub fn with_parent_context(mut self, parent_context: &'a CapturedContext) -> Self {
        self.parent_context = Some(parent_context);
        self
    }
}

pub(crate) struct CompiledInner {
    pub(crate) template: Arc<ParsedTemplate>,
    pub(crate) partials: Arc<PartialTable>,
    pub(crate) helpers: Arc<HelperRegistry>,
    pub(crate) settings: RenderSettings,
}

/// A compiled template: a pure function from data to text.
///
/// Rendering is synchronous and keeps no state between calls; all caching lives in
/// the scope that produced the template. Cloning is cheap.
#[derive(Clone)]
pub struct CompiledTemplate {
    inner: Option<Arc<CompiledInner>>,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("CompiledTemplate(empty)"),
            Some(inner) => f
                .debug_struct("CompiledTemplate")
                .field("source", &inner.template.source)
                .field("partials", &inner.partials.keys().collect::<Vec<_>>())
                .field("settings", &inner.settings)
                .finish(),
        }
    }
}

impl CompiledTemplate {
    /// The template produced for an absent source; renders `""` for any input.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    pub(crate) fn new(
        template: Arc<ParsedTemplate>,
        partials: Arc<PartialTable>,
        helpers: Arc<HelperRegistry>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            inner: Some(Arc::new(CompiledInner {
                template,
                partials,
                helpers,
                settings,
            })),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Source text of the root template (`""` for the empty template).
    pub fn source(&self) -> &str {
        self.inner
            .as_ref()
            .map_or("", |inner| inner.template.source.as_str())
    }

    /// Names of every partial bound into this template.
    pub fn partial_names(&self) -> Vec<&str> {
        self.inner
            .as_ref()
            .map(|inner| inner.partials.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn render(&self, data: &Value) -> Result<String, RenderError> {
        self.render_with(data, RenderOptions::default())
    }

    pub fn render_with(&self, data: &Value, options: RenderOptions<'_>) -> Result<String, RenderError> {
        let Some(inner) = &self.inner else {
            return Ok(String::new());
        };
        Renderer::new(
            &inner.helpers,
            &inner.partials,
            inner.settings,
            options,
            data,
        )
        .render(&inner.template.program)
    }
}

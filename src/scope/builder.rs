//! Construction of [`TemplateScope`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TemplateScope;
use super::error::ScopeError;
use super::fetcher::{NoRemoteFetcher, RemoteFetcher};
use crate::templating::{HelperArgs, HelperError, HelperRegistry, RenderSettings};

/// Identifies the component a scope compiles templates for. Attached to the
/// `compile` tracing span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

impl ScopeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component_tag(mut self, tag: impl Into<String>) -> Self {
        self.component_tag = Some(tag.into());
        self
    }

    pub fn with_component_id(mut self, id: impl Into<String>) -> Self {
        self.component_id = Some(id.into());
        self
    }

    pub fn with_template_id(mut self, id: impl Into<String>) -> Self {
        self.template_id = Some(id.into());
        self
    }
}

/// Serializable view of a scope's local partials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateScopeProps {
    #[serde(default)]
    pub partials: BTreeMap<String, String>,
}

/// Everything needed to create a scope in one call.
///
/// `helpers` are added on top of the default helper set.
#[derive(Clone, Default)]
pub struct TemplateScopeOptions {
    pub partials: BTreeMap<String, String>,
    pub helpers: HelperRegistry,
    pub fetcher: Option<Arc<dyn RemoteFetcher>>,
    pub settings: RenderSettings,
    pub trace: Option<ScopeTrace>,
}

impl fmt::Debug for TemplateScopeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateScopeOptions")
            .field("partials", &self.partials.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers)
            .field("fetcher", &self.fetcher.is_some())
            .field("settings", &self.settings)
            .field("trace", &self.trace)
            .finish()
    }
}

/// Builder for [`TemplateScope`].
///
/// Partial sources are parsed in [`build`](Self::build); registering the same
/// partial name twice is an error.
///
/// # Examples
///
/// ```
/// use hbscope::scope::TemplateScope;
///
/// let scope = TemplateScope::builder()
///     .register_partial("greeting", "Hello {{name}}")
///     .strict(true)
///     .build()
///     .unwrap();
/// assert_eq!(scope.get_partial("greeting"), Some("Hello {{name}}"));
/// ```
pub struct TemplateScopeBuilder {
    partials: Vec<(String, String)>,
    helpers: HelperRegistry,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
    settings: RenderSettings,
    trace: Option<ScopeTrace>,
}

impl Default for TemplateScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateScopeBuilder {
    pub fn new() -> Self {
        Self {
            partials: Vec::new(),
            helpers: HelperRegistry::with_defaults(),
            fetcher: None,
            settings: RenderSettings::default(),
            trace: None,
        }
    }

    pub fn register_partial(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.partials.push((name.into(), source.into()));
        self
    }

    /// Registers every partial from exported props.
    pub fn props(mut self, props: TemplateScopeProps) -> Self {
        self.partials.extend(props.partials);
        self
    }

    pub fn register_helper<F>(mut self, name: impl Into<String>, helper: F) -> Self
    where
        F: Fn(&HelperArgs<'_>) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        self.helpers.register(name, helper);
        self
    }

    pub fn helpers(mut self, helpers: &HelperRegistry) -> Self {
        self.helpers.merge(helpers);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.settings.strict = strict;
        self
    }

    pub fn escape_html(mut self, escape_html: bool) -> Self {
        self.settings.escape_html = escape_html;
        self
    }

    pub fn trace(mut self, trace: ScopeTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn build(self) -> Result<TemplateScope, ScopeError> {
        let mut seen = BTreeMap::new();
        for (name, source) in self.partials {
            if seen.contains_key(&name) {
                return Err(ScopeError::DuplicatePartial { name });
            }
            seen.insert(name, source);
        }

        let fetcher = self.fetcher.unwrap_or_else(|| Arc::new(NoRemoteFetcher));
        let mut scope = TemplateScope::from_parts(self.helpers, fetcher, self.settings, self.trace);
        for (name, source) in seen {
            scope.register_partial(name, &source)?;
        }
        Ok(scope)
    }
}

impl From<TemplateScopeOptions> for TemplateScopeBuilder {
    fn from(options: TemplateScopeOptions) -> Self {
        let mut builder = TemplateScopeBuilder::new().helpers(&options.helpers);
        builder.partials.extend(options.partials);
        builder.fetcher = options.fetcher;
        builder.settings = options.settings;
        builder.trace = options.trace;
        builder
    }
}

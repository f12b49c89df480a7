//! Template scopes: partial and helper stores plus asynchronous partial resolution.
//!
//! A [`TemplateScope`] owns
//!
//! - local partials, shared copy-on-write between a scope and its clones,
//! - a [`HelperRegistry`], shared by reference,
//! - a [`RemoteFetcher`] for names that look like identifiers (`prefix:name`, `<iri>`),
//! - a private [`RemoteCache`] so every remote identifier is fetched at most once.
//!
//! [`TemplateScope::compile`] parses a template, resolves the transitive closure of
//! its partial references and binds them into a [`CompiledTemplate`]. Rendering the
//! result is synchronous.
//!
//! # Derivation
//!
//! Cloning a scope snapshots its partials and helpers and starts an empty remote
//! cache. Registrations on either side after the clone are not visible to the other.
//! [`TemplateScope::global`] is a process-wide default scope (default helpers, no
//! remote source) that lives for the whole process; application code usually clones
//! it or builds its own scope with [`TemplateScope::builder`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use hbscope::scope::{InMemoryFetcher, TemplateScope};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let fetcher = InMemoryFetcher::new().with_template("ui:badge", "[{{label}}]");
//! let scope = TemplateScope::default().with_fetcher(Arc::new(fetcher));
//!
//! let template = scope.compile("Status: {{> ui:badge}}").await.unwrap();
//! assert_eq!(template.render(&json!({"label": "ok"})).unwrap(), "Status: [ok]");
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod error;
pub mod fetcher;
pub mod resolver;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use serde_json::Value;
use tracing::Instrument;

pub use builder::{ScopeTrace, TemplateScopeBuilder, TemplateScopeOptions, TemplateScopeProps};
pub use cache::{CacheStats, RemoteCache, RemoteFailure};
pub use error::{CompileError, ScopeError};
pub use fetcher::{
    DirectoryFetcher, FetchError, InMemoryFetcher, NoRemoteFetcher, RemoteFetcher,
    is_remote_reference, normalize_identifier,
};
pub use resolver::{PartialOrigin, PartialResolution, ResolvedClosure, ResolvedPartial};

use crate::templating::{
    CompiledTemplate, HelperArgs, HelperError, HelperRegistry, ParseError, ParsedTemplate,
    RenderSettings, parse,
};
use resolver::Resolver;

static GLOBAL_SCOPE: LazyLock<TemplateScope> = LazyLock::new(TemplateScope::default);

/// An isolated set of partials and helpers with its own remote cache.
pub struct TemplateScope {
    partials: Arc<BTreeMap<String, Arc<ParsedTemplate>>>,
    helpers: Arc<HelperRegistry>,
    fetcher: Arc<dyn RemoteFetcher>,
    settings: RenderSettings,
    trace: Option<ScopeTrace>,
    cache: RemoteCache,
}

impl Clone for TemplateScope {
    /// Snapshots partials and helpers; the clone gets an empty remote cache.
    fn clone(&self) -> Self {
        Self {
            partials: Arc::clone(&self.partials),
            helpers: Arc::clone(&self.helpers),
            fetcher: Arc::clone(&self.fetcher),
            settings: self.settings,
            trace: self.trace.clone(),
            cache: RemoteCache::new(),
        }
    }
}

impl Default for TemplateScope {
    /// Default helpers, no partials, remote references rejected.
    fn default() -> Self {
        Self::from_parts(
            HelperRegistry::with_defaults(),
            Arc::new(NoRemoteFetcher),
            RenderSettings::default(),
            None,
        )
    }
}

impl fmt::Debug for TemplateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateScope")
            .field("partials", &self.partials.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers)
            .field("settings", &self.settings)
            .field("trace", &self.trace)
            .field("cache", &self.cache)
            .finish()
    }
}

impl TemplateScope {
    pub(crate) fn from_parts(
        helpers: HelperRegistry,
        fetcher: Arc<dyn RemoteFetcher>,
        settings: RenderSettings,
        trace: Option<ScopeTrace>,
    ) -> Self {
        Self {
            partials: Arc::new(BTreeMap::new()),
            helpers: Arc::new(helpers),
            fetcher,
            settings,
            trace,
            cache: RemoteCache::new(),
        }
    }

    pub fn builder() -> TemplateScopeBuilder {
        TemplateScopeBuilder::new()
    }

    /// Creates a scope from options; `options.helpers` are added to the defaults.
    pub fn create(options: TemplateScopeOptions) -> Result<Self, ScopeError> {
        TemplateScopeBuilder::from(options).build()
    }

    /// The process-wide default scope. Clone it to derive a scope of your own.
    pub fn global() -> &'static TemplateScope {
        &GLOBAL_SCOPE
    }

    /// Replaces the remote fetcher and starts a fresh remote cache.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = fetcher;
        self.cache = RemoteCache::new();
        self
    }

    pub fn with_trace(mut self, trace: ScopeTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Registers or replaces a local partial. Local partials shadow remote ones
    /// of the same name.
    pub fn register_partial(&mut self, name: impl Into<String>, source: &str) -> Result<(), ScopeError> {
        let name = name.into();
        let parsed = parse(source).map_err(|source| ScopeError::PartialSyntax {
            name: name.clone(),
            source,
        })?;
        tracing::debug!(target: "hbscope::scope", partial = %name, "Registered partial");
        Arc::make_mut(&mut self.partials).insert(name, Arc::new(parsed));
        Ok(())
    }

    pub fn register_helper<F>(&mut self, name: impl Into<String>, helper: F)
    where
        F: Fn(&HelperArgs<'_>) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.helpers).register(name, helper);
    }

    /// Source of a local partial.
    pub fn get_partial(&self, name: &str) -> Option<&str> {
        self.partials.get(name).map(|p| p.source.as_str())
    }

    pub fn partial_names(&self) -> impl Iterator<Item = &str> {
        self.partials.keys().map(String::as_str)
    }

    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn trace(&self) -> Option<&ScopeTrace> {
        self.trace.as_ref()
    }

    /// How this scope resolves a partial name: local first, then remote identifiers.
    pub fn classify(&self, name: &str) -> PartialResolution {
        resolver::classify(&self.partials, name)
    }

    /// Compiles `source`, resolving every partial it reaches.
    ///
    /// `None` yields [`CompiledTemplate::empty`]. Syntax errors and unresolvable
    /// remote partials reject with a [`CompileError`]; names that are neither local
    /// nor remote are looked up again when rendering.
    pub async fn compile(&self, source: impl Into<Option<&str>>) -> Result<CompiledTemplate, CompileError> {
        let Some(source) = source.into() else {
            return Ok(CompiledTemplate::empty());
        };

        let trace = self.trace.as_ref();
        let span = tracing::info_span!(
            target: "hbscope::scope",
            "compile",
            component_tag = trace.and_then(|t| t.component_tag.as_deref()),
            component_id = trace.and_then(|t| t.component_id.as_deref()),
            template_id = trace.and_then(|t| t.template_id.as_deref()),
        );

        async {
            let closure = self.resolve_parsed(parse(source)?).await?;
            tracing::debug!(
                target: "hbscope::scope",
                partials = closure.partials.len(),
                unresolved = closure.unresolved.len(),
                "Compiled template"
            );
            Ok::<_, CompileError>(CompiledTemplate::new(
                Arc::clone(&closure.root),
                Arc::new(closure.partial_table()),
                Arc::clone(&self.helpers),
                self.settings,
            ))
        }
        .instrument(span)
        .await
    }

    /// Compiles against local partials only, without touching the remote fetcher.
    pub fn compile_local(&self, source: &str) -> Result<CompiledTemplate, ParseError> {
        let root = parse(source)?;
        Ok(CompiledTemplate::new(
            Arc::new(root),
            Arc::clone(&self.partials),
            Arc::clone(&self.helpers),
            self.settings,
        ))
    }

    /// Resolves the partial closure of `source` without building a template.
    pub async fn resolve_dependencies(&self, source: &str) -> Result<ResolvedClosure, CompileError> {
        self.resolve_parsed(parse(source)?).await
    }

    async fn resolve_parsed(&self, root: ParsedTemplate) -> Result<ResolvedClosure, CompileError> {
        let partials = Arc::clone(&self.partials);
        let resolver = Resolver {
            partials: &partials,
            cache: &self.cache,
            fetcher: &self.fetcher,
        };
        resolver.resolve(Arc::new(root)).await
    }

    /// Local partial sources, for handing a scope's configuration to another process.
    pub fn export_props(&self) -> TemplateScopeProps {
        TemplateScopeProps {
            partials: self
                .partials
                .iter()
                .map(|(name, template)| (name.clone(), template.source.clone()))
                .collect(),
        }
    }

    /// Forgets every cached remote partial.
    pub fn clear_cache(&self) {
        tracing::debug!(target: "hbscope::scope", entries = self.cache.len(), "Clearing remote cache");
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

//! Transitive partial resolution for one `compile()` call.
//!
//! Starting from the root template, references are classified level by level:
//! local partials win, remote-looking names go through the scope's [`RemoteCache`],
//! everything else is left for render-time lookup. Each name is visited once per
//! closure, which is what makes self-referencing partials terminate and diamonds
//! collapse to a single load.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;

use super::cache::RemoteCache;
use super::error::CompileError;
use super::fetcher::{RemoteFetcher, is_remote_reference, normalize_identifier};
use crate::constants::ROOT_TEMPLATE_NAME;
use crate::templating::{ParsedTemplate, PartialTable};

/// How a partial name is resolved by a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialResolution {
    /// Registered in the scope's partial store.
    Local(Arc<ParsedTemplate>),
    /// Loaded through the remote fetcher under this identifier.
    Remote(String),
    /// Neither; looked up again at render time (inline partials, failover blocks).
    Unresolved,
}

/// Classifies `name` against a local partial store.
pub fn classify(partials: &BTreeMap<String, Arc<ParsedTemplate>>, name: &str) -> PartialResolution {
    if let Some(template) = partials.get(name) {
        return PartialResolution::Local(Arc::clone(template));
    }
    if is_remote_reference(name) {
        return PartialResolution::Remote(normalize_identifier(name).to_string());
    }
    PartialResolution::Unresolved
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialOrigin {
    Local,
    Remote,
}

/// One partial in a resolved closure.
#[derive(Debug, Clone)]
pub struct ResolvedPartial {
    pub name: String,
    pub origin: PartialOrigin,
    /// The template that first referenced this partial.
    pub referrer: String,
    pub template: Arc<ParsedTemplate>,
}

impl ResolvedPartial {
    pub fn references(&self) -> &[String] {
        &self.template.references
    }
}

/// Every partial reachable from a root template, in discovery order.
#[derive(Debug, Clone)]
pub struct ResolvedClosure {
    pub root: Arc<ParsedTemplate>,
    pub partials: Vec<ResolvedPartial>,
    /// Names left for render-time lookup.
    pub unresolved: Vec<String>,
}

impl ResolvedClosure {
    pub fn get(&self, name: &str) -> Option<&ResolvedPartial> {
        self.partials.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.partials.iter().map(|p| p.name.as_str())
    }

    /// References of the root template, or of the named partial.
    pub fn references_of(&self, name: &str) -> &[String] {
        if name == ROOT_TEMPLATE_NAME {
            return &self.root.references;
        }
        self.get(name).map(ResolvedPartial::references).unwrap_or_default()
    }

    /// The partial table bound into a compiled template.
    pub fn partial_table(&self) -> PartialTable {
        self.partials
            .iter()
            .map(|p| (p.name.clone(), Arc::clone(&p.template)))
            .collect()
    }
}

pub(crate) struct Resolver<'a> {
    pub(crate) partials: &'a BTreeMap<String, Arc<ParsedTemplate>>,
    pub(crate) cache: &'a RemoteCache,
    pub(crate) fetcher: &'a Arc<dyn RemoteFetcher>,
}

impl Resolver<'_> {
    pub(crate) async fn resolve(&self, root: Arc<ParsedTemplate>) -> Result<ResolvedClosure, CompileError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut referrers: HashMap<String, String> = HashMap::new();
        let mut frontier = Vec::new();
        for name in &root.references {
            if seen.insert(name.clone()) {
                referrers.insert(name.clone(), ROOT_TEMPLATE_NAME.to_string());
                frontier.push(name.clone());
            }
        }

        let mut partials = Vec::new();
        let mut unresolved = Vec::new();
        while !frontier.is_empty() {
            tracing::trace!(target: "hbscope::resolver", pending = ?frontier, "Resolving partials");
            let loads = frontier.iter().map(|name| self.resolve_one(name, &referrers));
            let resolved = try_join_all(loads).await?;

            let mut next = Vec::new();
            for (name, outcome) in frontier.drain(..).zip(resolved) {
                let Some((origin, template)) = outcome else {
                    tracing::debug!(target: "hbscope::resolver", partial = %name, "Partial left for render-time lookup");
                    unresolved.push(name);
                    continue;
                };
                for reference in &template.references {
                    if seen.insert(reference.clone()) {
                        referrers.insert(reference.clone(), name.clone());
                        next.push(reference.clone());
                    }
                }
                let referrer = referrers.get(&name).cloned().unwrap_or_default();
                partials.push(ResolvedPartial {
                    name,
                    origin,
                    referrer,
                    template,
                });
            }
            frontier = next;
        }

        Ok(ResolvedClosure {
            root,
            partials,
            unresolved,
        })
    }

    async fn resolve_one(
        &self,
        name: &str,
        referrers: &HashMap<String, String>,
    ) -> Result<Option<(PartialOrigin, Arc<ParsedTemplate>)>, CompileError> {
        match classify(self.partials, name) {
            PartialResolution::Local(template) => Ok(Some((PartialOrigin::Local, template))),
            PartialResolution::Remote(identifier) => self
                .cache
                .load(&identifier, self.fetcher)
                .await
                .map(|template| Some((PartialOrigin::Remote, template)))
                .map_err(|failure| CompileError::from_remote(name, chain_to(referrers, name), failure)),
            PartialResolution::Unresolved => Ok(None),
        }
    }
}

/// Referrer chain from the root down to `name`.
fn chain_to(referrers: &HashMap<String, String>, name: &str) -> Vec<String> {
    let mut chain = vec![name.to_string()];
    let mut current = name;
    while let Some(parent) = referrers.get(current) {
        // First-referrer links always point to an earlier level, so this ends at the root.
        chain.push(parent.clone());
        current = parent;
    }
    chain.reverse();
    chain
}

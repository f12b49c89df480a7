//! Per-scope memoization of remote partials.
//!
//! Each identifier maps to one shared in-flight load (fetch + parse). Every caller
//! asking for the same identifier awaits a clone of that future, so a diamond or a
//! burst of concurrent `compile()` calls triggers exactly one fetch. Failed loads are
//! dropped from the map so a later compilation can retry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::fetcher::{FetchError, RemoteFetcher};
use crate::templating::{ParseError, ParsedTemplate, parse};

/// Why a remote partial could not be loaded. Cheap to clone so that every waiter
/// on a shared load receives the same failure.
#[derive(Debug, Clone)]
pub enum RemoteFailure {
    Fetch(Arc<FetchError>),
    Syntax(ParseError),
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFailure::Fetch(e) => write!(f, "{e}"),
            RemoteFailure::Syntax(e) => write!(f, "{e}"),
        }
    }
}

pub type RemoteLoad = Result<Arc<ParsedTemplate>, RemoteFailure>;

type SharedLoad = Shared<BoxFuture<'static, RemoteLoad>>;

/// Counters describing how the cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Identifiers currently cached (in flight or resolved).
    pub entries: usize,
    /// Loads served from an existing entry.
    pub hits: u64,
    /// Loads that started a fetch.
    pub misses: u64,
    /// Loads that failed and were evicted.
    pub failures: u64,
}

#[derive(Default)]
pub struct RemoteCache {
    entries: DashMap<String, SharedLoad>,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCache").field("stats", &self.stats()).finish()
    }
}

impl RemoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parsed partial for `identifier`, fetching it at most once.
    ///
    /// The shared future is registered before anything is awaited, so a second
    /// caller arriving while the fetch is pending joins it instead of fetching again.
    pub async fn load(&self, identifier: &str, fetcher: &Arc<dyn RemoteFetcher>) -> RemoteLoad {
        let load = match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "hbscope::cache", identifier, "Remote partial cache hit");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "hbscope::cache", identifier, "Remote partial cache miss, fetching");
                let load = start_load(identifier.to_string(), Arc::clone(fetcher));
                entry.insert(load.clone());
                load
            }
        };

        let result = load.clone().await;
        if let Err(failure) = &result {
            // Only evict the load that failed; a retry may already have replaced it.
            let removed = self
                .entries
                .remove_if(identifier, |_, cached| Shared::ptr_eq(cached, &load))
                .is_some();
            if removed {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "hbscope::cache",
                    identifier,
                    error = %failure,
                    "Evicted failed remote partial"
                );
            }
        }
        result
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Loads already in flight still complete for their waiters.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

fn start_load(identifier: String, fetcher: Arc<dyn RemoteFetcher>) -> SharedLoad {
    async move {
        let source = fetcher
            .fetch(&identifier)
            .await
            .map_err(|e| RemoteFailure::Fetch(Arc::new(e)))?;
        let parsed = parse(&source).map_err(RemoteFailure::Syntax)?;
        tracing::debug!(
            target: "hbscope::cache",
            identifier = %identifier,
            references = parsed.references.len(),
            "Loaded remote partial"
        );
        Ok(Arc::new(parsed))
    }
    .boxed()
    .shared()
}

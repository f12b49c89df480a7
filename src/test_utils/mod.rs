//! Test utilities for hbscope
//!
//! Helpers shared by unit tests and the integration/stress suites:
//! - [`init_test_logging`] installs a tracing subscriber once per test binary
//! - [`CountingFetcher`] records how often each identifier is fetched
//! - [`zoo_fetcher`] / [`fixture_scope`] provide the partial graph used across tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hbscope::test_utils::{CountingFetcher, fixture_scope, zoo_templates};
//!
//! # async fn example() {
//! let fetcher = Arc::new(CountingFetcher::new(zoo_templates()));
//! let scope = fixture_scope(fetcher.clone());
//! scope.compile("{{> zoo:elephant}}{{> zoo:mouse}}").await.unwrap();
//! assert_eq!(fetcher.fetch_count("zoo:lion"), 1);
//! # }
//! ```

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::scope::{FetchError, InMemoryFetcher, RemoteFetcher, TemplateScope};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither is set.
///
/// ```bash
/// RUST_LOG=hbscope=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// A fetcher that counts requests per identifier before delegating.
///
/// An optional delay keeps fetches in flight long enough for concurrent
/// compilations to overlap.
#[derive(Debug, Default)]
pub struct CountingFetcher {
    inner: InMemoryFetcher,
    counts: DashMap<String, usize>,
    delay: Option<Duration>,
}

impl CountingFetcher {
    pub fn new(inner: InMemoryFetcher) -> Self {
        Self {
            inner,
            counts: DashMap::new(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self, identifier: &str) -> usize {
        self.counts.get(identifier).map_or(0, |count| *count)
    }

    pub fn total_fetches(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Identifiers fetched more than once.
    pub fn duplicate_fetches(&self) -> Vec<String> {
        let mut duplicates: Vec<String> = self
            .counts
            .iter()
            .filter(|entry| *entry.value() > 1)
            .map(|entry| entry.key().clone())
            .collect();
        duplicates.sort();
        duplicates
    }
}

impl RemoteFetcher for CountingFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        *self.counts.entry(identifier.to_string()).or_insert(0) += 1;
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.fetch(identifier).await
        })
    }
}

/// Remote templates forming a diamond (`elephant`/`mouse` -> `lion`) and a
/// self-recursive `node`.
pub fn zoo_templates() -> InMemoryFetcher {
    InMemoryFetcher::new()
        .with_template("zoo:elephant", "elephant and {{> zoo:lion}}")
        .with_template("zoo:mouse", "mouse and {{> zoo:lion}}")
        .with_template("zoo:lion", "lion!")
        .with_template("zoo:node", "{{name}}({{#each items}}{{> zoo:node}};{{/each}})")
}

pub fn zoo_fetcher() -> Arc<CountingFetcher> {
    Arc::new(CountingFetcher::new(zoo_templates()))
}

/// A scope derived from the global default scope with `fetcher` installed.
pub fn fixture_scope(fetcher: Arc<dyn RemoteFetcher>) -> TemplateScope {
    TemplateScope::global().clone().with_fetcher(fetcher)
}

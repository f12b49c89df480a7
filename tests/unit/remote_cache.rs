//! Tests for `RemoteCache` memoization.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, join_all};
use hbscope::scope::{FetchError, RemoteCache, RemoteFailure, RemoteFetcher};
use hbscope::test_utils::{CountingFetcher, zoo_templates};

/// Fails the first `failures` requests, then serves a fixed body. Every
/// request stays pending briefly so concurrent callers overlap.
struct FlakyFetcher {
    failures: usize,
    calls: AtomicUsize,
}

impl RemoteFetcher for FlakyFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if call < self.failures {
                Err(FetchError::Other {
                    identifier: identifier.to_string(),
                    message: format!("attempt {call} failed"),
                })
            } else {
                Ok(format!("loaded {identifier}"))
            }
        })
    }
}

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let counting = Arc::new(CountingFetcher::new(zoo_templates()).with_delay(Duration::from_millis(25)));
    let fetcher: Arc<dyn RemoteFetcher> = counting.clone();
    let cache = RemoteCache::new();

    let loads = (0..16).map(|_| cache.load("zoo:lion", &fetcher));
    let results = join_all(loads).await;

    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
    assert_eq!(counting.fetch_count("zoo:lion"), 1);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 15);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let flaky = Arc::new(FlakyFetcher {
        failures: 1,
        calls: AtomicUsize::new(0),
    });
    let fetcher: Arc<dyn RemoteFetcher> = flaky.clone();
    let cache = RemoteCache::new();

    let err = cache.load("x:one", &fetcher).await.unwrap_err();
    assert!(matches!(err, RemoteFailure::Fetch(_)));
    assert!(err.to_string().contains("attempt 0 failed"));
    assert!(!cache.contains("x:one"));

    let template = cache.load("x:one", &fetcher).await.unwrap();
    assert_eq!(template.source, "loaded x:one");
    assert!(cache.contains("x:one"));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().failures, 1);
}

#[tokio::test]
async fn test_waiters_on_failed_load_all_see_the_error() {
    let flaky = Arc::new(FlakyFetcher {
        failures: usize::MAX,
        calls: AtomicUsize::new(0),
    });
    let fetcher: Arc<dyn RemoteFetcher> = flaky.clone();
    let cache = RemoteCache::new();

    let results = join_all((0..4).map(|_| cache.load("x:down", &fetcher))).await;
    assert!(results.iter().all(Result::is_err));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().failures, 1);
}

#[tokio::test]
async fn test_clear_forces_refetch() {
    let counting = Arc::new(CountingFetcher::new(zoo_templates()));
    let fetcher: Arc<dyn RemoteFetcher> = counting.clone();
    let cache = RemoteCache::new();

    cache.load("zoo:mouse", &fetcher).await.unwrap();
    cache.clear();
    assert!(cache.is_empty());
    cache.load("zoo:mouse", &fetcher).await.unwrap();
    assert_eq!(counting.fetch_count("zoo:mouse"), 2);
    assert_eq!(cache.len(), 1);
}

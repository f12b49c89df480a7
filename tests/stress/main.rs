//! Stress tests for hbscope
//!
//! These tests push the remote cache and the resolver with wide partial graphs
//! and many concurrent compilations. They are a separate test binary so the
//! regular suites stay fast.
//!
//! # Purpose
//!
//! - Prove that each remote identifier is fetched at most once per scope, no
//!   matter how many compilations race for it
//! - Prove that deep and wide closures resolve level by level without
//!   re-fetching shared partials
//! - Catch deadlocks in the cache (shard locks must never be held across awaits)
//!
//! # Running Stress Tests
//!
//! ```bash
//! cargo test --test stress
//! cargo test --test stress -- --nocapture
//! cargo test --test stress --release
//! ```
//!
//! # Interpreting Results
//!
//! - `duplicate_fetches()` must stay empty; any entry means two compilations
//!   missed each other's in-flight load
//! - Tests time out under a deadlock rather than failing; a hang here points at
//!   the cache entry API

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::try_join_all;
use hbscope::scope::{InMemoryFetcher, RemoteFetcher, TemplateScope};
use hbscope::test_utils::{CountingFetcher, fixture_scope, init_test_logging, zoo_templates};
use serde_json::json;

/// `width` leaves, each included by every one of `width` middle partials, all
/// included by the root: `width * width` edges onto `width` leaves.
fn wide_diamond(width: usize) -> InMemoryFetcher {
    let mut fetcher = InMemoryFetcher::new();
    for i in 0..width {
        fetcher.insert(format!("leaf:{i}"), format!("{i};"));
        let body: String = (0..width).map(|j| format!("{{{{> leaf:{j}}}}}")).collect();
        fetcher.insert(format!("mid:{i}"), format!("[{body}]"));
    }
    fetcher
}

fn wide_root(width: usize) -> String {
    (0..width).map(|i| format!("{{{{> mid:{i}}}}}")).collect()
}

#[tokio::test]
async fn test_wide_diamond_fetches_each_leaf_once() -> Result<()> {
    init_test_logging(None);
    let width = 40;
    let fetcher = Arc::new(CountingFetcher::new(wide_diamond(width)).with_delay(Duration::from_millis(2)));
    let scope = fixture_scope(fetcher.clone());

    let start = Instant::now();
    let template = scope.compile(wide_root(width).as_str()).await?;
    let compiled_in = start.elapsed();

    assert_eq!(fetcher.total_fetches(), width * 2);
    assert!(fetcher.duplicate_fetches().is_empty());

    let leaves: String = (0..width).map(|j| format!("{j};")).collect();
    let expected = format!("[{leaves}]").repeat(width);
    assert_eq!(template.render(&json!({}))?, expected);

    println!("wide diamond ({width}x{width}) compiled in {compiled_in:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_compilations_share_fetches() -> Result<()> {
    let fetcher = Arc::new(CountingFetcher::new(zoo_templates()).with_delay(Duration::from_millis(20)));
    let scope = Arc::new(fixture_scope(fetcher.clone()));

    let sources = [
        "Diamond: {{> zoo:elephant}}, {{> zoo:mouse}}",
        "{{> zoo:mouse}}",
        "{{> zoo:lion}}{{> zoo:lion}}",
        "{{> zoo:node}}",
    ];
    let handles: Vec<_> = (0..200)
        .map(|i| {
            let scope = Arc::clone(&scope);
            let source = sources[i % sources.len()];
            tokio::spawn(async move { scope.compile(source).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let template = handle.await??;
        if i % sources.len() == 0 {
            assert_eq!(
                template.render(&json!({}))?,
                "Diamond: elephant and lion!, mouse and lion!"
            );
        }
    }

    for identifier in ["zoo:elephant", "zoo:mouse", "zoo:lion", "zoo:node"] {
        assert_eq!(fetcher.fetch_count(identifier), 1, "{identifier} fetched more than once");
    }
    assert_eq!(scope.cache_stats().misses, 4);
    Ok(())
}

#[tokio::test]
async fn test_deep_chain_resolves_level_by_level() -> Result<()> {
    let depth = 60;
    let mut fetcher = InMemoryFetcher::new();
    for i in 0..depth {
        let body = if i + 1 < depth {
            format!("{i}>{{{{> chain:{}}}}}", i + 1)
        } else {
            format!("{i}")
        };
        fetcher.insert(format!("chain:{i}"), body);
    }
    let fetcher = Arc::new(CountingFetcher::new(fetcher));
    let scope = fixture_scope(fetcher.clone());

    let closure = scope.resolve_dependencies("{{> chain:0}}").await?;
    assert_eq!(closure.partials.len(), depth);
    assert_eq!(
        closure
            .get(&format!("chain:{}", depth - 1))
            .map(|p| p.referrer.clone()),
        Some(format!("chain:{}", depth - 2))
    );
    assert!(fetcher.duplicate_fetches().is_empty());

    let template = scope.compile("{{> chain:0}}").await?;
    let expected = (0..depth).map(|i| i.to_string()).collect::<Vec<_>>().join(">");
    assert_eq!(template.render(&json!({}))?, expected);
    assert_eq!(fetcher.total_fetches(), depth);
    Ok(())
}

#[tokio::test]
async fn test_large_template_compiles_in_linear_time() -> Result<()> {
    let tags = 50_000;
    let source = "{{x}}\n".repeat(tags);
    let scope = TemplateScope::global().clone();

    let start = Instant::now();
    let template = scope.compile(source.as_str()).await?;
    let compiled_in = start.elapsed();

    let out = template.render(&json!({"x": 7}))?;
    assert_eq!(out.len(), tags * 2);
    assert!(
        compiled_in < Duration::from_secs(10),
        "{tags} tags took {compiled_in:?} to compile"
    );

    println!("{tags} tags compiled in {compiled_in:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_isolated_scopes() -> Result<()> {
    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(zoo_templates());
    let base = TemplateScope::global().clone().with_fetcher(fetcher);

    let compiles = (0..64).map(|i| {
        let mut scope = base.clone();
        async move {
            scope.register_partial("who", &format!("scope {i}"))?;
            let template = scope.compile("{{> who}} sees {{> zoo:lion}}").await?;
            anyhow::Ok((i, template.render(&json!({}))?))
        }
    });

    for (i, output) in try_join_all(compiles).await? {
        assert_eq!(output, format!("scope {i} sees lion!"));
    }
    Ok(())
}

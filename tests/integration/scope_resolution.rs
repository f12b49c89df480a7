//! Integration tests for partial resolution across scopes.
//!
//! These tests verify that:
//! - Local partials shadow remote identifiers and never reach the fetcher
//! - Shared remote partials are fetched once per scope (diamonds, recursion)
//! - Scopes cloned from the same parent stay isolated
//! - Fetch and syntax failures reject `compile()` with the dependency chain

use std::sync::Arc;

use anyhow::Result;
use hbscope::scope::{
    CompileError, FetchError, InMemoryFetcher, PartialOrigin, PartialResolution, RemoteFetcher,
    ScopeError, TemplateScope,
};
use hbscope::templating::{CapturedContext, RenderOptions};
use hbscope::test_utils::{CountingFetcher, fixture_scope, init_test_logging, zoo_fetcher};
use serde_json::json;

#[tokio::test]
async fn test_missing_source_compiles_to_empty_template() -> Result<()> {
    init_test_logging(None);
    let fetcher = zoo_fetcher();
    let scope = fixture_scope(fetcher.clone());

    let template = scope.compile(None).await?;
    assert!(template.is_empty());
    assert_eq!(template.render(&json!(null))?, "");

    let parent = CapturedContext::default();
    let out = template.render_with(
        &json!({"anything": [1, 2, 3]}),
        RenderOptions::new().with_parent_context(&parent),
    )?;
    assert_eq!(out, "");
    assert_eq!(fetcher.total_fetches(), 0);
    Ok(())
}

#[tokio::test]
async fn test_local_partial_shadows_remote_without_fetching() -> Result<()> {
    let fetcher = zoo_fetcher();
    let mut scope = fixture_scope(fetcher.clone());
    scope.register_partial("zoo:lion", "local lion")?;

    assert!(matches!(scope.classify("zoo:lion"), PartialResolution::Local(_)));
    assert_eq!(
        scope.classify("zoo:mouse"),
        PartialResolution::Remote("zoo:mouse".to_string())
    );

    let template = scope.compile("{{> zoo:mouse}}").await?;
    assert_eq!(template.render(&json!({}))?, "mouse and local lion");
    assert_eq!(fetcher.fetch_count("zoo:lion"), 0);
    assert_eq!(fetcher.fetch_count("zoo:mouse"), 1);
    Ok(())
}

#[tokio::test]
async fn test_diamond_fetches_shared_partial_once() -> Result<()> {
    let fetcher = zoo_fetcher();
    let scope = fixture_scope(fetcher.clone());

    let template = scope.compile("Diamond: {{> zoo:elephant}}, {{> zoo:mouse}}").await?;
    assert_eq!(
        template.render(&json!({}))?,
        "Diamond: elephant and lion!, mouse and lion!"
    );
    assert_eq!(fetcher.fetch_count("zoo:lion"), 1);
    assert_eq!(fetcher.total_fetches(), 3);
    assert!(fetcher.duplicate_fetches().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cache_is_shared_between_compilations() -> Result<()> {
    let fetcher = zoo_fetcher();
    let scope = fixture_scope(fetcher.clone());

    scope.compile("{{> zoo:elephant}}").await?;
    scope.compile("{{> zoo:mouse}}").await?;
    scope.compile("{{> zoo:elephant}} and {{> zoo:mouse}}").await?;

    assert_eq!(fetcher.fetch_count("zoo:elephant"), 1);
    assert_eq!(fetcher.fetch_count("zoo:mouse"), 1);
    assert_eq!(fetcher.fetch_count("zoo:lion"), 1);

    let stats = scope.cache_stats();
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.misses, 3);
    assert!(stats.hits >= 3);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_compilations_share_in_flight_fetches() -> Result<()> {
    let fetcher = Arc::new(
        CountingFetcher::new(hbscope::test_utils::zoo_templates())
            .with_delay(std::time::Duration::from_millis(20)),
    );
    let scope = fixture_scope(fetcher.clone());

    let (a, b, c) = tokio::join!(
        scope.compile("{{> zoo:elephant}}"),
        scope.compile("{{> zoo:mouse}}"),
        scope.compile("{{> zoo:lion}}"),
    );
    assert_eq!(a?.render(&json!({}))?, "elephant and lion!");
    assert_eq!(b?.render(&json!({}))?, "mouse and lion!");
    assert_eq!(c?.render(&json!({}))?, "lion!");
    assert_eq!(fetcher.fetch_count("zoo:lion"), 1);
    Ok(())
}

#[tokio::test]
async fn test_recursive_remote_partial() -> Result<()> {
    let fetcher = zoo_fetcher();
    let scope = fixture_scope(fetcher.clone());

    let template = scope.compile("{{> zoo:node}}").await?;
    let data = json!({
        "name": "abc",
        "items": [
            {"name": "def"},
            {"name": "ghi", "items": [{"name": "jkl"}, {"name": "mno"}]}
        ]
    });
    assert_eq!(template.render(&data)?, "abc(def();ghi(jkl();mno(););)");
    assert_eq!(fetcher.fetch_count("zoo:node"), 1);
    Ok(())
}

#[tokio::test]
async fn test_scopes_from_same_parent_are_isolated() -> Result<()> {
    let mut first = TemplateScope::global().clone();
    let mut second = TemplateScope::global().clone();
    first.register_partial("foo", "FIRST")?;
    second.register_partial("foo", "SECOND")?;

    let (a, b) = tokio::try_join!(first.compile("{{> foo}}"), second.compile("{{> foo}}"))?;
    assert_eq!(a.render(&json!({}))?, "FIRST");
    assert_eq!(b.render(&json!({}))?, "SECOND");
    assert!(TemplateScope::global().get_partial("foo").is_none());
    Ok(())
}

#[tokio::test]
async fn test_clone_does_not_share_remote_cache() -> Result<()> {
    let fetcher = zoo_fetcher();
    let scope = fixture_scope(fetcher.clone());
    scope.compile("{{> zoo:lion}}").await?;

    let derived = scope.clone();
    derived.compile("{{> zoo:lion}}").await?;
    assert_eq!(fetcher.fetch_count("zoo:lion"), 2);
    assert_eq!(derived.cache_stats().misses, 1);
    Ok(())
}

#[tokio::test]
async fn test_unknown_remote_rejects() {
    let scope = fixture_scope(zoo_fetcher());

    let err = scope
        .compile("before {{> zoo:elephant}} {{> zoo:tiger}}")
        .await
        .unwrap_err();
    match &err {
        CompileError::PartialFetch { reference, chain, source } => {
            assert_eq!(reference, "zoo:tiger");
            assert_eq!(chain, &vec!["<root>".to_string(), "zoo:tiger".to_string()]);
            assert!(matches!(**source, FetchError::NotFound { .. }));
        }
        other => panic!("Expected PartialFetch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_nested_failure_reports_dependency_chain() {
    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(
        InMemoryFetcher::new()
            .with_template("site:page", "{{> site:layout}}")
            .with_template("site:layout", "<main>{{> site:missing}}</main>"),
    );
    let scope = TemplateScope::global().clone().with_fetcher(fetcher);

    let err = scope.compile("{{> site:page}}").await.unwrap_err();
    assert_eq!(err.reference(), Some("site:missing"));
    assert_eq!(
        err.chain(),
        ["<root>", "site:page", "site:layout", "site:missing"]
    );
    let message = err.format_with_context();
    assert!(message.contains("Dependency chain:"));
    assert!(message.contains("site:layout"));
}

#[tokio::test]
async fn test_remote_syntax_error_rejects_and_is_retried() -> Result<()> {
    let fetcher = Arc::new(CountingFetcher::new(
        InMemoryFetcher::new().with_template("bad:partial", "{{#if open}}never closed"),
    ));
    let scope = fixture_scope(fetcher.clone());

    for _ in 0..2 {
        let err = scope.compile("{{> bad:partial}}").await.unwrap_err();
        assert!(matches!(err, CompileError::PartialSyntax { .. }));
    }
    // Failed loads are not cached.
    assert_eq!(fetcher.fetch_count("bad:partial"), 2);
    assert_eq!(scope.cache_stats().entries, 0);
    Ok(())
}

#[tokio::test]
async fn test_root_syntax_error_rejects_before_fetching() {
    let fetcher = zoo_fetcher();
    let scope = fixture_scope(fetcher.clone());

    let err = scope.compile("{{> zoo:lion}}{{#each xs}}").await.unwrap_err();
    assert!(matches!(err, CompileError::Syntax(_)));
    assert_eq!(fetcher.total_fetches(), 0);
}

#[tokio::test]
async fn test_unresolved_local_name_fails_at_render_time() -> Result<()> {
    let mut scope = fixture_scope(zoo_fetcher());
    let template = scope.compile("[{{> footer}}]").await?;
    assert!(template.render(&json!({})).is_err());

    // Registering afterwards does not change an already compiled template.
    scope.register_partial("footer", "bottom")?;
    assert!(template.render(&json!({})).is_err());
    assert_eq!(scope.compile("[{{> footer}}]").await?.render(&json!({}))?, "[bottom]");
    Ok(())
}

#[tokio::test]
async fn test_resolve_dependencies_reports_origins() -> Result<()> {
    let mut scope = fixture_scope(zoo_fetcher());
    scope.register_partial("intro", "Hello {{> zoo:mouse}}")?;

    let closure = scope
        .resolve_dependencies("{{> intro}} {{> zoo:elephant}} {{> later}}")
        .await?;

    assert_eq!(
        closure.names().collect::<Vec<_>>(),
        vec!["intro", "zoo:elephant", "zoo:mouse", "zoo:lion"]
    );
    assert_eq!(closure.get("intro").map(|p| p.origin), Some(PartialOrigin::Local));
    assert_eq!(closure.get("zoo:lion").map(|p| p.origin), Some(PartialOrigin::Remote));
    assert_eq!(
        closure.get("zoo:lion").map(|p| p.referrer.as_str()),
        Some("zoo:elephant")
    );
    assert_eq!(closure.unresolved, vec!["later".to_string()]);
    Ok(())
}

#[test]
fn test_builder_rejects_duplicate_partials() {
    let err = TemplateScope::builder()
        .register_partial("header", "one")
        .register_partial("header", "two")
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ScopeError::DuplicatePartial {
            name: "header".to_string()
        }
    );
}

#[test]
fn test_local_partial_syntax_error_at_registration() {
    let mut scope = TemplateScope::default();
    let err = scope.register_partial("broken", "{{#if ready}}unclosed").unwrap_err();
    assert!(matches!(err, ScopeError::PartialSyntax { ref name, .. } if name == "broken"));
    assert!(scope.get_partial("broken").is_none());
}

//! Integration tests for rendering templates compiled through a scope.
//!
//! These tests verify that:
//! - Scope settings (strict mode, HTML escaping) are fixed at compile time
//! - Helpers registered on a scope are visible to its templates and its clones
//! - Remote partials take context arguments, hash arguments and partial blocks
//! - Compiled templates are plain values that render repeatably and from many threads

use std::sync::Arc;

use anyhow::Result;
use hbscope::scope::{InMemoryFetcher, RemoteFetcher, ScopeTrace, TemplateScope};
use hbscope::templating::{HelperArgs, HelperError, HelperRegistry, RenderError};
use serde_json::{Value, json};

fn card_fetcher() -> Arc<dyn RemoteFetcher> {
    Arc::new(
        InMemoryFetcher::new()
            .with_template("ui:card", "[{{label}}: {{name}}]")
            .with_template("ui:layout", "<main>{{> @partial-block}}</main>")
            .with_template("ui:list", "{{#each items}}{{> ui:card label=../label}}{{/each}}"),
    )
}

#[tokio::test]
async fn test_remote_partial_with_context_and_hash() -> Result<()> {
    let scope = TemplateScope::builder().fetcher(card_fetcher()).build()?;
    let template = scope
        .compile("{{> ui:card user label=\"Name\"}} {{> ui:card}}")
        .await?;

    let out = template.render(&json!({"user": {"name": "ann"}, "name": "root", "label": "L"}))?;
    assert_eq!(out, "[Name: ann] [L: root]");
    Ok(())
}

#[tokio::test]
async fn test_remote_layout_with_partial_block() -> Result<()> {
    let scope = TemplateScope::builder().fetcher(card_fetcher()).build()?;
    let template = scope
        .compile("{{#> ui:layout}}hello {{who}}{{/ui:layout}}")
        .await?;
    assert_eq!(template.render(&json!({"who": "world"}))?, "<main>hello world</main>");
    Ok(())
}

#[tokio::test]
async fn test_remote_partial_iterating_with_parent_access() -> Result<()> {
    let scope = TemplateScope::builder().fetcher(card_fetcher()).build()?;
    let template = scope.compile("{{> ui:list}}").await?;
    let out = template.render(&json!({
        "label": "item",
        "items": [{"name": "a"}, {"name": "b"}]
    }))?;
    assert_eq!(out, "[item: a][item: b]");
    Ok(())
}

#[tokio::test]
async fn test_scope_settings_apply_to_compiled_templates() -> Result<()> {
    let data = json!({"html": "<b>bold</b>"});

    let escaping = TemplateScope::builder().build()?;
    assert_eq!(
        escaping.compile("{{html}}").await?.render(&data)?,
        "&lt;b&gt;bold&lt;/b&gt;"
    );

    let raw = TemplateScope::builder().escape_html(false).build()?;
    assert_eq!(raw.compile("{{html}}").await?.render(&data)?, "<b>bold</b>");

    let strict = TemplateScope::builder().strict(true).build()?;
    let err = strict
        .compile("{{htm}}")
        .await?
        .render(&data)
        .unwrap_err();
    assert!(matches!(err, RenderError::VariableNotFound { ref path, .. } if path == "htm"));
    assert_eq!(err.suggestions(), ["html".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_registered_helpers_are_scoped() -> Result<()> {
    let shout = |args: &HelperArgs<'_>| -> Result<Value, HelperError> {
        let text = args.require(0)?.as_str().unwrap_or_default().to_uppercase();
        Ok(Value::String(format!("{text}!")))
    };

    let mut loud = TemplateScope::global().clone();
    loud.register_helper("shout", shout);
    let quiet = TemplateScope::global().clone();

    let template = loud.compile("{{shout name}}").await?;
    assert_eq!(template.render(&json!({"name": "hey"}))?, "HEY!");

    let err = quiet
        .compile("{{shout name}}")
        .await?
        .render(&json!({"name": "hey"}))
        .unwrap_err();
    assert!(matches!(err, RenderError::MissingHelper { .. }));

    // Clones inherit helpers registered before cloning.
    let derived = loud.clone();
    assert!(derived.helpers().contains("shout"));
    Ok(())
}

#[tokio::test]
async fn test_builder_merges_helper_registries() -> Result<()> {
    let mut extra = HelperRegistry::new();
    extra.register("twice", |args: &HelperArgs<'_>| {
        let n = args.require(0)?.as_i64().unwrap_or_default();
        Ok(json!(n * 2))
    });

    let scope = TemplateScope::builder().helpers(&extra).build()?;
    assert!(scope.helpers().contains("uppercase"));
    let template = scope.compile("{{twice n}} {{uppercase s}}").await?;
    assert_eq!(template.render(&json!({"n": 21, "s": "ok"}))?, "42 OK");
    Ok(())
}

#[tokio::test]
async fn test_inline_partials_resolve_at_render_time() -> Result<()> {
    let scope = TemplateScope::default();
    let template = scope
        .compile("{{#*inline \"row\"}}<{{this}}>{{/inline}}{{#each xs}}{{> row}}{{/each}}")
        .await?;
    assert_eq!(template.render(&json!({"xs": ["a", "b"]}))?, "<a><b>");
    Ok(())
}

#[tokio::test]
async fn test_compiled_template_renders_across_threads() -> Result<()> {
    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(
        InMemoryFetcher::new().with_template("t:greeting", "hello {{name}}"),
    );
    let scope = TemplateScope::default().with_fetcher(fetcher);
    let template = Arc::new(scope.compile("{{> t:greeting}}").await?);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let template = Arc::clone(&template);
            tokio::task::spawn_blocking(move || template.render(&json!({"name": i})))
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await??, format!("hello {i}"));
    }
    Ok(())
}

#[tokio::test]
async fn test_trace_is_kept_on_scope() -> Result<()> {
    let trace = ScopeTrace::new()
        .with_component_tag("x-card")
        .with_template_id("card-main");
    let scope = TemplateScope::builder().trace(trace.clone()).build()?;
    assert_eq!(scope.trace(), Some(&trace));
    assert_eq!(scope.clone().trace(), Some(&trace));

    // Tracing metadata does not change output.
    assert_eq!(scope.compile("ok").await?.render(&json!({}))?, "ok");
    Ok(())
}

//! Integration tests for the two-pass capture/restore protocol.
//!
//! The first pass renders with a `ContextCapturer` and produces template source;
//! the second pass compiles that source on a scope and renders it with the
//! captured snapshot as parent context.

use std::sync::Arc;

use anyhow::Result;
use hbscope::scope::{InMemoryFetcher, RemoteFetcher, TemplateScope};
use hbscope::templating::{CaptureScopeId, CapturedContext, ContextCapturer, RenderOptions};
use serde_json::{Value, json};

/// Renders `source` once with capture enabled, then renders the staged output
/// with `second_data` and the captured snapshot.
async fn two_pass(
    scope: &TemplateScope,
    source: &str,
    first_data: Value,
    second_data: Value,
) -> Result<(String, CapturedContext)> {
    let capturer = ContextCapturer::new();
    let staged = scope
        .compile(source)
        .await?
        .render_with(&first_data, RenderOptions::new().with_capturer(&capturer))?;
    let parent = capturer.get_result();

    let out = scope
        .compile(staged.as_str())
        .await?
        .render_with(&second_data, RenderOptions::new().with_parent_context(&parent))?;
    Ok((out, parent))
}

#[tokio::test]
async fn test_flat_capture_round_trip() -> Result<()> {
    let scope = TemplateScope::global().clone();
    let (out, parent) = two_pass(
        &scope,
        "{{{{capture x=2 y=20}}}}x={{x}} y={{y}} z={{z}}{{{{/capture}}}}",
        json!({"x": 1, "y": 10, "z": 100}),
        json!({"y": 30}),
    )
    .await?;
    assert_eq!(out, "x=2 y=20 z=100");

    let scope_id: CaptureScopeId = "0@".parse()?;
    assert_eq!(parent.get(&scope_id, "x"), Some(&json!(2)));
    assert_eq!(parent.get(&scope_id, "z"), Some(&json!(100)));
    Ok(())
}

#[tokio::test]
async fn test_nested_iteration_round_trip() -> Result<()> {
    let scope = TemplateScope::global().clone();
    let (out, parent) = two_pass(
        &scope,
        "{{#each xs}}{{#each ../ys}}{{{{capture}}}}({{../this}},{{this}},{{@../index}},{{@index}}){{{{/capture}}}}{{/each}}{{/each}}",
        json!({"xs": [1, 2], "ys": [10, 20]}),
        json!({"xs": [9], "ys": [99]}),
    )
    .await?;
    assert_eq!(out, "(1,10,0,0)(1,20,0,1)(2,10,1,0)(2,20,1,1)");

    let indices: Vec<Vec<usize>> = parent.scopes().into_iter().map(|s| s.indices).collect();
    assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_survives_json_between_passes() -> Result<()> {
    let scope = TemplateScope::global().clone();
    let capturer = ContextCapturer::new();
    let staged = scope
        .compile("{{#each people}}{{{{capture}}}}{{name}} is {{age}}; {{{{/capture}}}}{{/each}}")
        .await?
        .render_with(
            &json!({"people": [{"name": "ann", "age": 31}, {"name": "bo", "age": 7}]}),
            RenderOptions::new().with_capturer(&capturer),
        )?;

    // Persist the snapshot as a separate process would.
    let serialized = serde_json::to_string(&capturer.get_result())?;
    let restored: CapturedContext = serde_json::from_str(&serialized)?;
    assert_eq!(restored, capturer.get_result());

    let out = scope
        .compile(staged.as_str())
        .await?
        .render_with(&json!({}), RenderOptions::new().with_parent_context(&restored))?;
    assert_eq!(out, "ann is 31; bo is 7; ");
    Ok(())
}

#[tokio::test]
async fn test_capture_inside_remote_partial() -> Result<()> {
    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(InMemoryFetcher::new().with_template(
        "ui:row",
        "{{{{capture}}}}<td>{{label}}={{value}}</td>{{{{/capture}}}}",
    ));
    let scope = TemplateScope::global().clone().with_fetcher(fetcher);

    let (out, parent) = two_pass(
        &scope,
        "{{#each rows}}{{> ui:row}}{{/each}}",
        json!({"rows": [{"label": "a", "value": 1}, {"label": "b", "value": 2}]}),
        json!({"label": "wrong"}),
    )
    .await?;
    assert_eq!(out, "<td>a=1</td><td>b=2</td>");
    assert_eq!(parent.scopes().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_staged_output_without_parent_context_uses_data() -> Result<()> {
    let scope = TemplateScope::global().clone();
    let capturer = ContextCapturer::new();
    let staged = scope
        .compile("{{{{capture x=1}}}}{{x}}{{{{/capture}}}}")
        .await?
        .render_with(&json!({}), RenderOptions::new().with_capturer(&capturer))?;

    let out = scope.compile(staged.as_str()).await?.render(&json!({"x": "data"}))?;
    assert_eq!(out, "data");
    Ok(())
}

#[tokio::test]
async fn test_three_pass_inheritance() -> Result<()> {
    let scope = TemplateScope::global().clone();

    let first = ContextCapturer::new();
    let staged = scope
        .compile("{{{{capture a=1}}}}{{{{capture b=2}}}}{{a}}-{{b}}{{{{/capture}}}}{{{{/capture}}}}")
        .await?
        .render_with(&json!({}), RenderOptions::new().with_capturer(&first))?;
    let parent = first.get_result();
    assert_eq!(first.captured_scopes(), 1);

    let second = ContextCapturer::inherit_and_capture(&parent);
    let staged = scope.compile(staged.as_str()).await?.render_with(
        &json!({}),
        RenderOptions::new()
            .with_capturer(&second)
            .with_parent_context(&parent),
    )?;
    let grandparent = second.get_result();
    assert_eq!(second.captured_scopes(), 1);
    assert!(grandparent.len() > parent.len());

    let out = scope.compile(staged.as_str()).await?.render_with(
        &json!({"a": "lost", "b": "lost"}),
        RenderOptions::new().with_parent_context(&grandparent),
    )?;
    assert_eq!(out, "1-2");
    Ok(())
}

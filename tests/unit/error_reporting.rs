//! Tests for user-facing error presentation of library failures.

use hbscope::core::{HbscopeError, user_friendly_error};
use hbscope::scope::TemplateScope;
use hbscope::test_utils::{fixture_scope, zoo_fetcher};
use serde_json::json;

#[tokio::test]
async fn test_failed_compile_carries_dependency_chain() {
    let mut scope = fixture_scope(zoo_fetcher());
    scope.register_partial("page", "{{> zoo:elephant}} {{> zoo:panda}}").unwrap();

    let err = scope.compile("{{> page}}").await.unwrap_err();
    let ctx = user_friendly_error(err.into());

    assert!(matches!(ctx.error, HbscopeError::Compile(_)));
    let details = ctx.details.unwrap();
    assert!(details.contains("zoo:panda"));
    assert!(details.contains("page"));
}

#[tokio::test]
async fn test_render_failure_suggests_similar_names() {
    let scope = TemplateScope::builder().strict(true).build().unwrap();
    let template = scope.compile("{{usr.name}}").await.unwrap();
    let err = template.render(&json!({"user": {"name": "x"}})).unwrap_err();

    let ctx = user_friendly_error(err.into());
    assert!(matches!(ctx.error, HbscopeError::Render(_)));
    assert!(ctx.suggestion.unwrap().starts_with("Did you mean"));
}

#[test]
fn test_duplicate_partial_is_reported() {
    let err = TemplateScope::builder()
        .register_partial("a", "1")
        .register_partial("a", "2")
        .build()
        .unwrap_err();
    let ctx = user_friendly_error(err.into());
    assert_eq!(ctx.error.to_string(), "Partial 'a' is already registered");
    assert!(ctx.suggestion.is_some());
}

#[test]
fn test_invalid_json_is_reported_as_data_error() {
    let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
    let ctx = user_friendly_error(err.into());
    assert!(matches!(ctx.error, HbscopeError::InvalidData { .. }));
}

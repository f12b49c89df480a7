//! Integration tests for configuration loading.
//!
//! Tests touching `HBSCOPE_CONFIG` / `HBSCOPE_TEMPLATE_DIR` are `#[serial]`
//! because the process environment is shared between test threads.

use anyhow::Result;
use hbscope::config::ScopeConfig;
use hbscope::core::HbscopeError;
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

const ENV_VARS: [&str; 2] = ["HBSCOPE_CONFIG", "HBSCOPE_TEMPLATE_DIR"];

/// Clears the hbscope environment when dropped.
struct EnvGuard;

impl EnvGuard {
    fn set(pairs: &[(&str, &std::path::Path)]) -> Self {
        for (key, value) in pairs {
            // SAFETY: callers are #[serial]; no other test thread reads the environment.
            unsafe { std::env::set_var(key, value) };
        }
        Self
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in ENV_VARS {
            // SAFETY: see EnvGuard::set.
            unsafe { std::env::remove_var(key) };
        }
    }
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("hbscope.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
#[serial]
async fn test_explicit_path_wins_over_environment() -> Result<()> {
    let explicit_dir = TempDir::new()?;
    let env_dir = TempDir::new()?;
    let explicit = write_config(&explicit_dir, "strict = true\n");
    let from_env = write_config(&env_dir, "escape_html = false\n");
    let _guard = EnvGuard::set(&[("HBSCOPE_CONFIG", from_env.as_path())]);

    let config = ScopeConfig::load(Some(explicit.as_path())).await?;
    assert!(config.strict);
    assert!(config.escape_html);

    let config = ScopeConfig::load(None).await?;
    assert!(!config.strict);
    assert!(!config.escape_html);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_template_dir_environment_override() -> Result<()> {
    let config_dir = TempDir::new()?;
    let templates = TempDir::new()?;
    std::fs::create_dir_all(templates.path().join("mail"))?;
    std::fs::write(templates.path().join("mail/footer.hbs"), "-- {{team}}")?;

    let path = write_config(&config_dir, "[remote]\ntemplate_dir = \"does-not-exist\"\n");
    let _guard = EnvGuard::set(&[("HBSCOPE_TEMPLATE_DIR", templates.path())]);

    let config = ScopeConfig::load(Some(path.as_path())).await?;
    assert_eq!(config.remote.template_dir.as_deref(), Some(templates.path()));

    let scope = config.build_scope()?;
    let out = scope
        .compile("Thanks {{> mail:footer}}")
        .await?
        .render(&json!({"team": "ops"}))?;
    assert_eq!(out, "Thanks -- ops");
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_missing_explicit_file_is_an_error() {
    let _guard = EnvGuard::set(&[]);
    let dir = TempDir::new().unwrap();
    let result = ScopeConfig::load(Some(dir.path().join("absent.toml").as_path())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_toml_reports_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[remote\nextension = 3");

    let err = ScopeConfig::load_from(&path).await.unwrap_err();
    match err.downcast_ref::<HbscopeError>() {
        Some(HbscopeError::ConfigParseError { file, .. }) => {
            assert!(file.ends_with("hbscope.toml"));
        }
        other => panic!("Expected ConfigParseError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_configured_partials_and_settings_reach_scope() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
escape_html = false

[partials]
greeting = "<b>Hello {{name}}</b>"
"#,
    );

    let config = ScopeConfig::load_from(&path).await?;
    let scope = config.build_scope()?;
    assert_eq!(scope.get_partial("greeting"), Some("<b>Hello {{name}}</b>"));

    let out = scope
        .compile("{{> greeting}} {{markup}}")
        .await?
        .render(&json!({"name": "ann", "markup": "<i>x</i>"}))?;
    assert_eq!(out, "<b>Hello ann</b> <i>x</i>");
    Ok(())
}

#[tokio::test]
async fn test_remote_partials_disabled_without_template_dir() {
    let config = ScopeConfig::default();
    let scope = config.build_scope().unwrap();
    let err = scope.compile("{{> mail:footer}}").await.unwrap_err();
    assert_eq!(err.reference(), Some("mail:footer"));
}

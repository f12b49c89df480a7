//! Common utilities for CLI commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use crate::config::ScopeConfig;
use crate::core::HbscopeError;
use crate::scope::TemplateScope;

/// Path argument meaning "read from stdin".
pub const STDIN_PATH: &str = "-";

/// Options shared by every command that builds a scope.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub config_path: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub async fn load_config(&self) -> Result<ScopeConfig> {
        ScopeConfig::load(self.config_path.as_deref()).await
    }

    /// Builds the configured scope and registers `--partial NAME=FILE` arguments on top.
    /// Command-line partials replace configured ones of the same name.
    pub async fn load_scope(&self, partial_args: &[String]) -> Result<TemplateScope> {
        let config = self.load_config().await?;
        build_scope(&config, partial_args).await
    }
}

/// Builds a scope from `config` plus `--partial NAME=FILE` arguments.
pub async fn build_scope(config: &ScopeConfig, partial_args: &[String]) -> Result<TemplateScope> {
    let mut scope = config.build_scope()?;
    for arg in partial_args {
        let (name, path) = parse_partial_arg(arg)?;
        let source = read_template(&path).await?;
        scope.register_partial(name, &source)?;
    }
    Ok(scope)
}

/// Splits `NAME=FILE`.
pub fn parse_partial_arg(value: &str) -> Result<(String, PathBuf), HbscopeError> {
    match value.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(HbscopeError::InvalidPartialArgument {
            value: value.to_string(),
        }),
    }
}

/// Reads template source from a file, or stdin for `-`.
pub async fn read_template(path: &Path) -> Result<String> {
    if path.as_os_str() == STDIN_PATH {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read template from stdin")?;
        return Ok(source);
    }
    if !path.exists() {
        return Err(HbscopeError::TemplateNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read template {}", path.display()))
}

/// Reads and deserializes a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        HbscopeError::InvalidData {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Render data from `--data`, or an empty object.
pub async fn read_data(path: Option<&Path>) -> Result<Value> {
    match path {
        Some(path) => read_json(path).await,
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}

/// Writes to a file, or stdout when no path is given.
pub async fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{content}");
            Ok(())
        }
    }
}

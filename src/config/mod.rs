//! Configuration for scopes built by the `hbscope` binary.
//!
//! The configuration file is TOML:
//!
//! ```toml
//! strict = false
//! escape_html = true
//!
//! [remote]
//! template_dir = "templates"   # DirectoryFetcher root
//! extension = "hbs"
//!
//! [partials]
//! header = "<h1>{{title}}</h1>"
//! ```
//!
//! # Lookup Order
//!
//! 1. `--config <path>`
//! 2. `HBSCOPE_CONFIG`
//! 3. `./hbscope.toml`, if present
//! 4. Built-in defaults
//!
//! An explicitly named file must exist. A relative `template_dir` is resolved
//! against the directory of the file it was read from. `HBSCOPE_TEMPLATE_DIR`
//! overrides `remote.template_dir` after loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{CONFIG_FILE_NAME, DEFAULT_TEMPLATE_EXTENSION, ENV_CONFIG_PATH, ENV_TEMPLATE_DIR};
use crate::core::HbscopeError;
use crate::scope::{
    DirectoryFetcher, NoRemoteFetcher, RemoteFetcher, TemplateScope, TemplateScopeBuilder,
    TemplateScopeProps,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Fail on missing variables.
    pub strict: bool,
    /// HTML-escape `{{ }}` output.
    pub escape_html: bool,
    pub remote: RemoteConfig,
    /// Inline partial sources by name.
    pub partials: BTreeMap<String, String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            strict: false,
            escape_html: true,
            remote: RemoteConfig::default(),
            partials: BTreeMap::new(),
        }
    }
}

/// Where remote (`prefix:name`) partials are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Root directory for [`DirectoryFetcher`]. Remote partials are disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    pub extension: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            template_dir: None,
            extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
        }
    }
}

impl ScopeConfig {
    /// Loads configuration following the lookup order above.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(ENV_CONFIG_PATH)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    let local = PathBuf::from(CONFIG_FILE_NAME);
                    local.exists().then_some(local)
                }),
        };

        let mut config = match path {
            Some(path) => Self::load_from(&path).await?,
            None => {
                tracing::debug!(target: "hbscope::config", "No configuration file, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads a specific file. Relative `template_dir` values are anchored at the
    /// file's directory.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let mut config = Self::parse(&content).map_err(|e| HbscopeError::ConfigParseError {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(dir) = &config.remote.template_dir
            && dir.is_relative()
            && let Some(parent) = path.parent()
        {
            config.remote.template_dir = Some(parent.join(dir));
        }

        tracing::debug!(
            target: "hbscope::config",
            path = %path.display(),
            partials = config.partials.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Applies `HBSCOPE_TEMPLATE_DIR`, if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os(ENV_TEMPLATE_DIR).filter(|value| !value.is_empty()) {
            tracing::debug!(target: "hbscope::config", dir = ?dir, "Template directory overridden by environment");
            self.remote.template_dir = Some(PathBuf::from(dir));
        }
    }

    /// The remote fetcher this configuration describes.
    pub fn fetcher(&self) -> Arc<dyn RemoteFetcher> {
        match &self.remote.template_dir {
            Some(dir) => Arc::new(DirectoryFetcher::new(dir).with_extension(&self.remote.extension)),
            None => Arc::new(NoRemoteFetcher),
        }
    }

    /// A builder seeded with this configuration; callers may add partials and helpers.
    pub fn scope_builder(&self) -> TemplateScopeBuilder {
        TemplateScope::builder()
            .strict(self.strict)
            .escape_html(self.escape_html)
            .fetcher(self.fetcher())
            .props(TemplateScopeProps {
                partials: self.partials.clone(),
            })
    }

    pub fn build_scope(&self) -> Result<TemplateScope> {
        Ok(self.scope_builder().build()?)
    }
}

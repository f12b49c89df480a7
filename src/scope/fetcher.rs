//! Remote partial sources.
//!
//! A [`RemoteFetcher`] turns a remote identifier into template source text. The
//! scope decides *whether* a name is remote ([`is_remote_reference`]) and caches
//! results; fetchers only know how to load.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use futures::future::BoxFuture;
use regex::Regex;
use thiserror::Error;

use crate::constants::{DEFAULT_TEMPLATE_EXTENSION, PARTIAL_BLOCK_NAME};

/// Errors produced while loading remote template source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Remote template '{identifier}' not found")]
    NotFound { identifier: String },

    #[error("Invalid remote template identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Remote templates are disabled, cannot load '{identifier}'")]
    Disabled { identifier: String },

    #[error("Failed to read remote template '{identifier}' from {path}")]
    Io {
        identifier: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load remote template '{identifier}': {message}")]
    Other { identifier: String, message: String },
}

impl FetchError {
    pub fn identifier(&self) -> &str {
        match self {
            FetchError::NotFound { identifier }
            | FetchError::InvalidIdentifier { identifier, .. }
            | FetchError::Disabled { identifier }
            | FetchError::Io { identifier, .. }
            | FetchError::Other { identifier, .. } => identifier,
        }
    }
}

/// Loads template source for a remote identifier.
///
/// Implementations are shared between concurrent compilations and must be
/// `Send + Sync`. Each identifier is requested at most once per scope cache.
pub trait RemoteFetcher: Send + Sync {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

static PREFIXED_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$").ok());

/// Whether a partial name should be resolved through the remote fetcher.
///
/// Remote names are `<...>` bracketed IRIs or prefixed names such as
/// `platform:card` / `http://example.org/t`.
pub fn is_remote_reference(name: &str) -> bool {
    if name == PARTIAL_BLOCK_NAME {
        return false;
    }
    if let Some(inner) = name.strip_prefix('<').and_then(|n| n.strip_suffix('>')) {
        return !inner.is_empty() && !inner.contains(char::is_whitespace);
    }
    PREFIXED_NAME.as_ref().is_some_and(|re| re.is_match(name))
}

/// Identifier handed to the fetcher: the name with IRI brackets removed.
pub fn normalize_identifier(name: &str) -> &str {
    name.strip_prefix('<')
        .and_then(|n| n.strip_suffix('>'))
        .unwrap_or(name)
}

/// Serves templates from a fixed map; unknown identifiers are rejected.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    templates: HashMap<String, String>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, identifier: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(identifier, source);
        self
    }

    pub fn insert(&mut self, identifier: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(identifier.into(), source.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InMemoryFetcher {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            templates: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl RemoteFetcher for InMemoryFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        let result = self.templates.get(identifier).cloned().ok_or_else(|| {
            FetchError::NotFound {
                identifier: identifier.to_string(),
            }
        });
        Box::pin(async move { result })
    }
}

/// Rejects every identifier. Used when no remote source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteFetcher;

impl RemoteFetcher for NoRemoteFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            Err(FetchError::Disabled {
                identifier: identifier.to_string(),
            })
        })
    }
}

/// Loads remote templates from files below a root directory.
///
/// `prefix:local/name` maps to `<root>/prefix/local/name.<extension>`; for IRIs
/// the scheme becomes the first directory and leading slashes are dropped
/// (`http://example.org/t` maps to `<root>/http/example.org/t.hbs`).
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
    extension: String,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an identifier to the file it is loaded from.
    pub fn path_for(&self, identifier: &str) -> Result<PathBuf, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        };

        let name = normalize_identifier(identifier);
        let (prefix, local) = name
            .split_once(':')
            .ok_or_else(|| invalid("expected 'prefix:name'"))?;
        let local = local.trim_start_matches('/');
        if prefix.is_empty() || local.is_empty() {
            return Err(invalid("empty prefix or local name"));
        }

        let relative = Path::new(prefix).join(format!("{local}.{}", self.extension));
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::ParentDir => return Err(invalid("'..' segments are not allowed")),
                _ => return Err(invalid("absolute paths are not allowed")),
            }
        }
        Ok(self.root.join(relative))
    }
}

impl RemoteFetcher for DirectoryFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            let path = self.path_for(identifier)?;
            tracing::debug!(identifier, path = %path.display(), "Reading remote template");
            match tokio::fs::read_to_string(&path).await {
                Ok(source) => Ok(source),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                    identifier: identifier.to_string(),
                }),
                Err(source) => Err(FetchError::Io {
                    identifier: identifier.to_string(),
                    path,
                    source,
                }),
            }
        })
    }
}

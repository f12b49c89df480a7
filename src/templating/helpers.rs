//! Helper registry and the default helper set.
//!
//! Helpers are plain functions over already-evaluated arguments. The block helpers
//! `if`, `unless`, `each`, `with` and `captured` need control over rendering and are
//! implemented by the renderer itself; everything here returns a [`Value`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use strsim::levenshtein;

use super::error::HelperError;
use super::value::{is_truthy, to_output_string};
use crate::constants::{MAX_SUGGESTIONS, SIMILARITY_THRESHOLD_PERCENT};

/// Arguments passed to a helper invocation.
#[derive(Debug, Clone, Copy)]
pub struct HelperArgs<'a> {
    /// Name the helper was invoked as.
    pub name: &'a str,
    pub params: &'a [Value],
    pub hash: &'a Map<String, Value>,
    /// The current context (`this`) at the call site.
    pub context: &'a Value,
}

impl<'a> HelperArgs<'a> {
    pub fn param(&self, index: usize) -> Option<&'a Value> {
        self.params.get(index)
    }

    pub fn hash_value(&self, key: &str) -> Option<&'a Value> {
        self.hash.get(key)
    }

    /// Returns the positional argument at `index` or an error naming the helper.
    pub fn require(&self, index: usize) -> Result<&'a Value, HelperError> {
        self.param(index).ok_or_else(|| {
            HelperError::new(format!(
                "'{}' expects at least {} argument(s), got {}",
                self.name,
                index + 1,
                self.params.len()
            ))
        })
    }
}

/// Signature of a registered helper.
pub type HelperFn = dyn Fn(&HelperArgs<'_>) -> Result<Value, HelperError> + Send + Sync;

/// Named helpers. Cloning is cheap; the functions are shared by reference.
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: BTreeMap<String, Arc<HelperFn>>,
}

impl fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HelperRegistry {
    /// A registry containing only the built-in value helpers (`lookup`, `log`).
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register("lookup", lookup);
        registry.register("log", log);
        registry
    }

    /// Built-ins plus the default helper set seeded into every scope.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("eq", |args: &HelperArgs<'_>| {
            Ok(Value::Bool(loose_eq(args.require(0)?, args.require(1)?)))
        });
        registry.register("ne", |args: &HelperArgs<'_>| {
            Ok(Value::Bool(!loose_eq(args.require(0)?, args.require(1)?)))
        });
        registry.register("gt", |args: &HelperArgs<'_>| {
            compare(args).map(|ord| Value::Bool(ord == Some(std::cmp::Ordering::Greater)))
        });
        registry.register("lt", |args: &HelperArgs<'_>| {
            compare(args).map(|ord| Value::Bool(ord == Some(std::cmp::Ordering::Less)))
        });
        registry.register("not", |args: &HelperArgs<'_>| {
            Ok(Value::Bool(!is_truthy(args.require(0)?)))
        });
        registry.register("and", |args: &HelperArgs<'_>| {
            Ok(Value::Bool(!args.params.is_empty() && args.params.iter().all(is_truthy)))
        });
        registry.register("or", |args: &HelperArgs<'_>| {
            Ok(Value::Bool(args.params.iter().any(is_truthy)))
        });
        registry.register("concat", |args: &HelperArgs<'_>| {
            Ok(Value::String(args.params.iter().map(to_output_string).collect()))
        });
        registry.register("join", join);
        registry.register("jsonStringify", |args: &HelperArgs<'_>| {
            serde_json::to_string(args.require(0)?)
                .map(Value::String)
                .map_err(|e| HelperError::new(e.to_string()))
        });
        registry.register("uppercase", |args: &HelperArgs<'_>| {
            Ok(Value::String(to_output_string(args.require(0)?).to_uppercase()))
        });
        registry.register("lowercase", |args: &HelperArgs<'_>| {
            Ok(Value::String(to_output_string(args.require(0)?).to_lowercase()))
        });
        registry
    }

    /// Registers a helper, replacing any previous helper with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, helper: F)
    where
        F: Fn(&HelperArgs<'_>) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        self.helpers.insert(name.into(), Arc::new(helper));
    }

    /// Copies every helper of `other` into this registry, replacing same-named ones.
    pub fn merge(&mut self, other: &HelperRegistry) {
        for (name, helper) in &other.helpers {
            self.helpers.insert(name.clone(), Arc::clone(helper));
        }
    }

    pub fn get(&self, name: &str) -> Option<&HelperFn> {
        self.helpers.get(name).map(|helper| helper.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

/// Finds names similar to `target` using Levenshtein distance.
///
/// Returns at most [`MAX_SUGGESTIONS`] names whose distance is within
/// [`SIMILARITY_THRESHOLD_PERCENT`] of the target length, closest first.
pub(crate) fn find_similar<'a>(
    target: &str,
    available: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut scored: Vec<_> = available
        .into_iter()
        .filter(|candidate| *candidate != target)
        .map(|candidate| (candidate.to_string(), levenshtein(target, candidate)))
        .collect();
    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored.dedup_by(|a, b| a.0 == b.0);

    scored
        .into_iter()
        .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
        .take(MAX_SUGGESTIONS)
        .map(|(name, _)| name)
        .collect()
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(args: &HelperArgs<'_>) -> Result<Option<std::cmp::Ordering>, HelperError> {
    let a = args.require(0)?;
    let b = args.require(1)?;
    Ok(match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    })
}

fn join(args: &HelperArgs<'_>) -> Result<Value, HelperError> {
    let separator = args
        .param(1)
        .or_else(|| args.hash_value("sep"))
        .map(to_output_string)
        .unwrap_or_else(|| ",".to_string());
    match args.require(0)? {
        Value::Array(items) => Ok(Value::String(
            items
                .iter()
                .map(to_output_string)
                .collect::<Vec<_>>()
                .join(&separator),
        )),
        Value::Null => Ok(Value::String(String::new())),
        other => Err(HelperError::new(format!(
            "'join' expects an array, got {}",
            type_name(other)
        ))),
    }
}

fn lookup(args: &HelperArgs<'_>) -> Result<Value, HelperError> {
    let target = args.require(0)?;
    let key = args.require(1)?;
    let found = match (target, key) {
        (Value::Object(map), key) => map.get(&to_output_string(key)),
        (Value::Array(items), Value::Number(n)) => {
            n.as_u64().and_then(|i| items.get(usize::try_from(i).ok()?))
        }
        (Value::Array(items), Value::String(s)) => {
            s.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    };
    Ok(found.cloned().unwrap_or(Value::Null))
}

fn log(args: &HelperArgs<'_>) -> Result<Value, HelperError> {
    let message = args
        .params
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    let level = args.hash_value("level").map(to_output_string).unwrap_or_default();
    match level.as_str() {
        "debug" => tracing::debug!(target: "hbscope::template", "{message}"),
        "warn" => tracing::warn!(target: "hbscope::template", "{message}"),
        "error" => tracing::error!(target: "hbscope::template", "{message}"),
        _ => tracing::info!(target: "hbscope::template", "{message}"),
    }
    Ok(Value::Null)
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

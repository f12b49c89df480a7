//! Two-pass context capture.
//!
//! A first render pass run with a [`ContextCapturer`] turns every
//! `{{{{capture}}}}...{{{{/capture}}}}` block into `{{#captured "<id>"}}...{{/captured}}`
//! and records the bindings visible at that point under the id. The snapshot
//! returned by [`ContextCapturer::get_result`] is passed as the parent context of
//! a second, independent render of the produced source; inside each `captured`
//! region lookups consult the recorded bindings before ordinary data.
//!
//! Ids carry the iteration index path of the capture site (`3@1.0`: fourth capture,
//! outer index 1, inner index 0) so every iteration keeps its own bindings.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of one capture site evaluation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureScopeId {
    /// Position of the capture within the capturer (unique per capturer).
    pub ordinal: usize,
    /// Enclosing iteration indices, outermost first.
    pub indices: Vec<usize>,
}

impl fmt::Display for CaptureScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@", self.ordinal)?;
        for (position, index) in self.indices.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

/// Error for malformed capture scope ids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid capture scope id '{0}'")]
pub struct InvalidScopeId(pub String);

impl FromStr for CaptureScopeId {
    type Err = InvalidScopeId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidScopeId(s.to_string());
        let (ordinal, indices) = s.split_once('@').ok_or_else(invalid)?;
        let ordinal = ordinal.parse().map_err(|_| invalid())?;
        let indices = if indices.is_empty() {
            Vec::new()
        } else {
            indices
                .split('.')
                .map(|index| index.parse().map_err(|_| invalid()))
                .collect::<Result<Vec<usize>, _>>()?
        };
        Ok(Self { ordinal, indices })
    }
}

/// Composite key of a captured binding: capture site plus variable name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureKey {
    pub scope: CaptureScopeId,
    pub name: String,
}

/// Immutable snapshot of captured bindings.
///
/// Serializes to JSON as `{ "<scope id>": { "<name>": value, ... }, ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "CapturedRepr", try_from = "CapturedRepr")]
pub struct CapturedContext {
    entries: Arc<BTreeMap<CaptureKey, Value>>,
}

type CapturedRepr = BTreeMap<String, BTreeMap<String, Value>>;

impl From<CapturedContext> for CapturedRepr {
    fn from(context: CapturedContext) -> Self {
        let mut repr = CapturedRepr::new();
        for (key, value) in context.entries.iter() {
            repr.entry(key.scope.to_string())
                .or_default()
                .insert(key.name.clone(), value.clone());
        }
        repr
    }
}

impl TryFrom<CapturedRepr> for CapturedContext {
    type Error = InvalidScopeId;

    fn try_from(repr: CapturedRepr) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for (scope, bindings) in repr {
            let scope: CaptureScopeId = scope.parse()?;
            for (name, value) in bindings {
                entries.insert(
                    CaptureKey {
                        scope: scope.clone(),
                        name,
                    },
                    value,
                );
            }
        }
        Ok(Self {
            entries: Arc::new(entries),
        })
    }
}

impl CapturedContext {
    /// Looks up one binding.
    pub fn get(&self, scope: &CaptureScopeId, name: &str) -> Option<&Value> {
        self.entries.get(&CaptureKey {
            scope: scope.clone(),
            name: name.to_string(),
        })
    }

    /// All bindings recorded under `scope`, or `None` if the scope was never captured.
    pub fn scope_bindings(&self, scope: &CaptureScopeId) -> Option<BTreeMap<String, Value>> {
        let start = CaptureKey {
            scope: scope.clone(),
            name: String::new(),
        };
        let bindings: BTreeMap<String, Value> = self
            .entries
            .range(start..)
            .take_while(|(key, _)| &key.scope == scope)
            .map(|(key, value)| (key.name.clone(), value.clone()))
            .collect();
        if bindings.is_empty() {
            None
        } else {
            Some(bindings)
        }
    }

    pub fn scopes(&self) -> Vec<CaptureScopeId> {
        let mut scopes: Vec<CaptureScopeId> =
            self.entries.keys().map(|key| key.scope.clone()).collect();
        scopes.dedup();
        scopes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CaptureKey, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_ordinal(&self) -> usize {
        self.entries
            .keys()
            .map(|key| key.scope.ordinal + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Collects bindings during a render pass.
///
/// A capturer belongs to a single render invocation; it uses interior mutability
/// so the renderer can record through a shared reference.
#[derive(Debug, Default)]
pub struct ContextCapturer {
    base: CapturedContext,
    next_ordinal: Cell<usize>,
    recorded: RefCell<BTreeMap<CaptureKey, Value>>,
}

impl ContextCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a capturer whose result extends `parent`.
    ///
    /// Used when a restored region is rendered again with capture enabled: the new
    /// snapshot keeps the parent's scopes and allocates ordinals after them.
    pub fn inherit_and_capture(parent: &CapturedContext) -> Self {
        Self {
            base: parent.clone(),
            next_ordinal: Cell::new(parent.next_ordinal()),
            recorded: RefCell::new(BTreeMap::new()),
        }
    }

    /// Records `bindings` under a fresh scope id and returns the id.
    pub fn capture(
        &self,
        indices: Vec<usize>,
        bindings: impl IntoIterator<Item = (String, Value)>,
    ) -> CaptureScopeId {
        let ordinal = self.next_ordinal.get();
        self.next_ordinal.set(ordinal + 1);
        let scope = CaptureScopeId { ordinal, indices };

        let mut recorded = self.recorded.borrow_mut();
        for (name, value) in bindings {
            recorded.insert(
                CaptureKey {
                    scope: scope.clone(),
                    name,
                },
                value,
            );
        }
        scope
    }

    /// Number of capture scopes recorded by this capturer (excluding inherited ones).
    pub fn captured_scopes(&self) -> usize {
        self.next_ordinal.get() - self.base.next_ordinal()
    }

    /// Snapshot of everything captured so far, merged over the inherited parent.
    pub fn get_result(&self) -> CapturedContext {
        let mut entries = (*self.base.entries).clone();
        entries.extend(
            self.recorded
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        CapturedContext {
            entries: Arc::new(entries),
        }
    }
}

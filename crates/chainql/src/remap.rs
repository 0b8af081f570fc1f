//! Variable remapping: caller-facing names and values to wire-level ones.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::QueryError;

/// Transform applied to one source variable.
///
/// Receives the source key, its value and an immutable snapshot of all
/// variables; returns the edits to apply or a rejection message.
pub type RemapFn =
    Arc<dyn Fn(&str, &Value, &Map<String, Value>) -> Result<RemapPatch, String> + Send + Sync>;

/// A single remap rule.
#[derive(Clone)]
pub enum RemapRule {
    /// Move the value to another variable name.
    Rename(String),
    /// Compute edits from the value.
    Transform(RemapFn),
}

impl fmt::Debug for RemapRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename(to) => f.debug_tuple("Rename").field(to).finish(),
            Self::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PatchOp {
    Set(String, Value),
    Merge {
        key: String,
        field: String,
        value: Value,
    },
    Remove(String),
}

/// Edits returned by a transform, applied in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemapPatch {
    ops: Vec<PatchOp>,
    assign: Option<(String, Value)>,
}

impl RemapPatch {
    /// An empty patch: the source is dropped, nothing is written.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(PatchOp::Set(key.into(), value.into()));
        self
    }

    /// Set `field` inside the object variable `key`, creating it if needed.
    #[must_use]
    pub fn merge(
        mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.ops.push(PatchOp::Merge {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Remove a variable.
    #[must_use]
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push(PatchOp::Remove(key.into()));
        self
    }

    /// Write the rule's result under `key`, as a rename would.
    #[must_use]
    pub fn assign(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assign = Some((key.into(), value.into()));
        self
    }

    fn apply(self, source: &str, vars: &mut Map<String, Value>) {
        for op in self.ops {
            match op {
                PatchOp::Set(key, value) => {
                    vars.insert(key, value);
                }
                PatchOp::Merge { key, field, value } => {
                    let slot = vars
                        .entry(key)
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !slot.is_object() {
                        *slot = Value::Object(Map::new());
                    }
                    if let Value::Object(object) = slot {
                        object.insert(field, value);
                    }
                }
                PatchOp::Remove(key) => {
                    vars.shift_remove(&key);
                }
            }
        }
        match self.assign {
            Some((key, value)) => {
                let keep_source = key == source;
                vars.insert(key, value);
                if !keep_source {
                    vars.shift_remove(source);
                }
            }
            None => {
                vars.shift_remove(source);
            }
        }
    }
}

/// Whether a variable holds a usable value.
pub(crate) const fn is_defined(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Apply `rules` in order to `vars`.
///
/// Rules whose source variable is undefined are skipped. On a transform
/// rejection nothing is returned, so a partially remapped set is never used.
pub fn apply_remap(
    mut vars: Map<String, Value>,
    rules: &[(String, RemapRule)],
) -> Result<Map<String, Value>, QueryError> {
    for (source, rule) in rules {
        if !is_defined(vars.get(source)) {
            continue;
        }
        match rule {
            RemapRule::Rename(target) => {
                if target == source {
                    continue;
                }
                if let Some(value) = vars.shift_remove(source) {
                    vars.insert(target.clone(), value);
                }
            }
            RemapRule::Transform(transform) => {
                let value = vars.get(source).cloned().unwrap_or(Value::Null);
                let patch = (**transform)(source, &value, &vars).map_err(|message| {
                    QueryError::Transform {
                        variable: source.clone(),
                        message,
                    }
                })?;
                patch.apply(source, &mut vars);
            }
        }
    }
    Ok(vars)
}

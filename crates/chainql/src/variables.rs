//! Query variables and their inline serialization.

use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::remap::is_defined;

/// Ordered variable values; `null` and absent both mean "unset".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSet {
    values: Map<String, Value>,
}

impl VariableSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Current value, if defined.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    /// Unset a value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Whether `name` holds a defined value.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        is_defined(self.values.get(name))
    }

    /// Names of all stored values, defined or not.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// `defaults ⊕ self`: caller values win over defaults of the same name.
    ///
    /// Caller values that are `null` do not mask a default.
    #[must_use]
    pub fn merged_over(&self, defaults: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = defaults.clone();
        for (name, value) in &self.values {
            if !value.is_null() {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl From<Map<String, Value>> for VariableSet {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// Serialize variables as a bare `name: value, …` argument fragment.
///
/// Unset values are dropped at the top level and inside objects. `null`
/// list elements are kept so positions do not shift. Numbers, lists and
/// objects are written as-is, values of enum variables (`is_enum`) are
/// written unquoted, every other scalar is written as a quoted string.
pub fn render_arguments(vars: &Map<String, Value>, is_enum: impl Fn(&str) -> bool) -> String {
    let mut out = String::new();
    for (name, value) in vars {
        if value.is_null() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(", ");
        }
        let _ = write!(out, "{name}: ");
        render_value(Some(name.as_str()), value, &is_enum, &mut out);
    }
    out
}

fn render_value(
    key: Option<&str>,
    value: &Value,
    is_enum: &impl Fn(&str) -> bool,
    out: &mut String,
) {
    let bare = key.is_some_and(is_enum);
    match value {
        Value::Null => out.push_str("null"),
        Value::Number(number) => {
            let _ = write!(out, "{number}");
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                render_value(None, item, is_enum, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let defined = map.iter().filter(|(_, item)| !item.is_null());
            for (idx, (name, item)) in defined.enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{name}: ");
                render_value(Some(name.as_str()), item, is_enum, out);
            }
            out.push('}');
        }
        Value::String(text) if bare => out.push_str(text),
        Value::Bool(flag) if bare => {
            let _ = write!(out, "{flag}");
        }
        Value::String(text) => out.push_str(&quote(text)),
        Value::Bool(flag) => out.push_str(&quote(&flag.to_string())),
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}

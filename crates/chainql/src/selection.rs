//! Field selection: which result fields a query returns.

use std::fmt::Write as _;

use serde_json::Value;

use crate::error::QueryError;
use crate::schema::FieldShape;

/// Caller-selected subset of a descriptor's field shape.
///
/// Leaves are included when `true`; objects recurse. Lists are selected
/// through their element shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    /// Scalar field, included or excluded.
    Leaf(bool),
    /// Nested object with ordered child selections.
    Object(Vec<(String, FieldSelection)>),
}

impl FieldSelection {
    /// Select every field of `shape`.
    #[must_use]
    pub fn from_shape(shape: &FieldShape) -> Self {
        match shape.element() {
            FieldShape::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(key, child)| (key.clone(), Self::from_shape(child)))
                    .collect(),
            ),
            _ => Self::Leaf(true),
        }
    }

    /// Build a selection from JSON.
    ///
    /// `false`, `0`, `""` and `null` exclude a field, other scalars include
    /// it. An array stands for its first element.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(key, child)| (key.clone(), Self::from_json(child)))
                    .collect(),
            ),
            Value::Array(items) => items.first().map_or(Self::Leaf(false), Self::from_json),
            Value::Bool(flag) => Self::Leaf(*flag),
            Value::Null => Self::Leaf(false),
            Value::Number(number) => Self::Leaf(number.as_f64().is_some_and(|n| n != 0.0)),
            Value::String(text) => Self::Leaf(!text.is_empty()),
        }
    }

    /// Check that every selected path exists in `shape`.
    pub fn validate(&self, shape: &FieldShape) -> Result<(), QueryError> {
        validate_fields(self, shape, "")
    }

    /// Render as a brace-delimited, newline-separated field list.
    ///
    /// Returns `None` when nothing is selected.
    #[must_use]
    pub fn render(&self, indent: usize) -> Option<String> {
        let Self::Object(fields) = self else {
            return None;
        };
        let pad = " ".repeat(indent + 2);
        let mut body = String::new();
        for (key, child) in fields {
            match child {
                Self::Leaf(true) => {
                    let _ = writeln!(body, "{pad}{key}");
                }
                Self::Leaf(false) => {}
                Self::Object(_) => {
                    if let Some(block) = child.render(indent + 2) {
                        let _ = writeln!(body, "{pad}{key} {block}");
                    }
                }
            }
        }
        if body.is_empty() {
            return None;
        }
        Some(format!("{{\n{body}{}}}", " ".repeat(indent)))
    }
}

impl From<Value> for FieldSelection {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

fn validate_fields(
    selection: &FieldSelection,
    shape: &FieldShape,
    prefix: &str,
) -> Result<(), QueryError> {
    let FieldSelection::Object(fields) = selection else {
        return Ok(());
    };
    for (key, child) in fields {
        let Some(child_shape) = shape.field(key) else {
            return Err(QueryError::IllegalField {
                path: format!("{prefix}{key}"),
            });
        };
        if matches!(child, FieldSelection::Object(_)) {
            validate_fields(child, child_shape, &format!("{prefix}{key}."))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn shape() -> FieldShape {
        FieldShape::from_template(&json!({
            "id": "",
            "owner": {"address": "", "key": ""},
            "tags": [{"name": "", "value": ""}],
            "block": {"height": 0},
        }))
    }

    #[test]
    fn subset_selection_is_valid() {
        let selection = FieldSelection::from_json(&json!({
            "id": true,
            "owner": {"address": true},
            "tags": [{"name": true}],
        }));
        selection.validate(&shape()).expect("valid selection");
    }

    #[test]
    fn unknown_top_level_field_is_named() {
        let selection = FieldSelection::from_json(&json!({"unknownField": true}));
        let err = selection.validate(&shape()).expect_err("illegal");
        assert!(matches!(err, QueryError::IllegalField { ref path } if path == "unknownField"));
    }

    #[test]
    fn unknown_nested_field_reports_dotted_path() {
        let selection = FieldSelection::from_json(&json!({"tags": {"colour": true}}));
        let err = selection.validate(&shape()).expect_err("illegal");
        assert!(matches!(err, QueryError::IllegalField { ref path } if path == "tags.colour"));

        let selection = FieldSelection::from_json(&json!({"id": {"deeper": true}}));
        let err = selection.validate(&shape()).expect_err("illegal");
        assert!(matches!(err, QueryError::IllegalField { ref path } if path == "id.deeper"));
    }

    #[test]
    fn truthiness_follows_json_values() {
        let selection = FieldSelection::from_json(&json!({
            "a": 1, "b": 0, "c": "", "d": "x", "e": null, "f": false,
        }));
        let FieldSelection::Object(fields) = selection else {
            panic!("expected object");
        };
        let flags: Vec<_> = fields
            .iter()
            .map(|(_, child)| child == &FieldSelection::Leaf(true))
            .collect();
        assert_eq!(flags, [true, false, false, true, false, false]);
    }

    #[test]
    fn render_skips_excluded_and_empty_objects() {
        let selection = FieldSelection::from_json(&json!({
            "id": true,
            "owner": {"address": false},
            "tags": [{"name": true, "value": false}],
            "block": {"height": 1},
        }));
        let rendered = selection.render(0).expect("rendered");
        assert_eq!(
            rendered,
            "{\n  id\n  tags {\n    name\n  }\n  block {\n    height\n  }\n}"
        );
    }

    #[test]
    fn full_selection_covers_shape() {
        let selection = FieldSelection::from_shape(&shape());
        selection.validate(&shape()).expect("valid");
        let rendered = selection.render(2).expect("rendered");
        assert!(rendered.contains("tags {\n      name\n      value\n    }"));
        assert!(rendered.ends_with("\n  }"));
    }

    #[test]
    fn nothing_selected_renders_none() {
        let selection = FieldSelection::from_json(&json!({"id": false}));
        assert_eq!(selection.render(0), None);
    }
}

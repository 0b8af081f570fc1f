//! Query descriptors: the static schema data a query is built from.
//!
//! A [`QueryDescriptor`] names a GraphQL query, describes the shape of the
//! objects it returns, declares its variables (with defaults), and carries the
//! remap and paging rules used when the query text is built. Descriptors are
//! immutable once built and are shared between query instances via `Arc`.

mod catalog;
mod registry;

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::remap::{RemapFn, RemapPatch, RemapRule};

pub use catalog::parse_timestamp;
pub use registry::{RESERVED_NAMES, SchemaRegistry, SearchOptions, check_descriptor};

/// Shape of a result field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    /// Leaf value.
    Scalar,
    /// Nested object with ordered fields.
    Object(Vec<(String, FieldShape)>),
    /// List of values sharing one element shape.
    List(Box<FieldShape>),
}

impl FieldShape {
    /// Derive a shape from a JSON template.
    ///
    /// Objects become [`FieldShape::Object`], arrays become a
    /// [`FieldShape::List`] of their first element, anything else is a scalar.
    #[must_use]
    pub fn from_template(template: &Value) -> Self {
        match template {
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_template(value)))
                    .collect(),
            ),
            Value::Array(items) => Self::List(Box::new(
                items.first().map_or(Self::Scalar, Self::from_template),
            )),
            _ => Self::Scalar,
        }
    }

    /// Look up a direct child field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Object(fields) => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, shape)| shape),
            Self::List(element) => element.field(name),
            Self::Scalar => None,
        }
    }

    /// Unwrap list nesting down to the element shape.
    #[must_use]
    pub fn element(&self) -> &Self {
        match self {
            Self::List(element) => element.element(),
            other => other,
        }
    }
}

/// Names of the paging fields exposed by a cursor-paginated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingInfo {
    /// `pageInfo` flag signalling another page.
    pub has_next_page: String,
    /// Edge field holding the cursor.
    pub cursor: String,
    /// Caller-facing variable that controls page size.
    pub limit_variable: Option<String>,
}

impl Default for PagingInfo {
    fn default() -> Self {
        Self {
            has_next_page: "hasNextPage".into(),
            cursor: "cursor".into(),
            limit_variable: None,
        }
    }
}

impl PagingInfo {
    /// Set the page-size variable name.
    #[must_use]
    pub fn with_limit_variable(mut self, name: impl Into<String>) -> Self {
        self.limit_variable = Some(name.into());
        self
    }
}

/// Static schema for one named query.
#[derive(Clone)]
pub struct QueryDescriptor {
    name: String,
    version: u32,
    fields: FieldShape,
    variables: Map<String, Value>,
    enum_variables: BTreeSet<String>,
    remap: Vec<(String, RemapRule)>,
    paging: Option<PagingInfo>,
    endpoint_override: Option<String>,
}

impl fmt::Debug for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("enum_variables", &self.enum_variables)
            .field(
                "remap",
                &self.remap.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            )
            .field("paging", &self.paging)
            .finish_non_exhaustive()
    }
}

impl QueryDescriptor {
    /// Start building a descriptor for the GraphQL query `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> QueryDescriptorBuilder {
        QueryDescriptorBuilder {
            inner: Self {
                name: name.into(),
                version: 1,
                fields: FieldShape::Object(Vec::new()),
                variables: Map::new(),
                enum_variables: BTreeSet::new(),
                remap: Vec::new(),
                paging: None,
                endpoint_override: None,
            },
        }
    }

    /// GraphQL query name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema version of this descriptor.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Result field shape.
    #[must_use]
    pub const fn fields(&self) -> &FieldShape {
        &self.fields
    }

    /// Declared variables with their defaults (`null` = no default).
    #[must_use]
    pub const fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Whether `name` is a declared variable.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Whether values of `name` are serialized as bare enum identifiers.
    #[must_use]
    pub fn is_enum(&self, name: &str) -> bool {
        self.enum_variables.contains(name)
    }

    /// Remap rules in declaration order.
    #[must_use]
    pub fn remap_rules(&self) -> &[(String, RemapRule)] {
        &self.remap
    }

    /// Paging configuration, if the query is cursor-paginated.
    #[must_use]
    pub const fn paging(&self) -> Option<&PagingInfo> {
        self.paging.as_ref()
    }

    /// Endpoint this query should use instead of the client default.
    #[must_use]
    pub fn endpoint_override(&self) -> Option<&str> {
        self.endpoint_override.as_deref()
    }
}

/// Builder for [`QueryDescriptor`].
#[derive(Debug, Clone)]
pub struct QueryDescriptorBuilder {
    inner: QueryDescriptor,
}

impl QueryDescriptorBuilder {
    /// Set the schema version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.inner.version = version;
        self
    }

    /// Set the result shape from a JSON template.
    #[must_use]
    pub fn fields(mut self, template: &Value) -> Self {
        self.inner.fields = FieldShape::from_template(template);
        self
    }

    /// Set the result shape directly.
    #[must_use]
    pub fn field_shape(mut self, shape: FieldShape) -> Self {
        self.inner.fields = shape;
        self
    }

    /// Declare a variable with a default value (`Value::Null` for none).
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.inner.variables.insert(name.into(), default.into());
        self
    }

    /// Declare a variable without a default.
    #[must_use]
    pub fn optional(self, name: impl Into<String>) -> Self {
        self.variable(name, Value::Null)
    }

    /// Mark a variable as an enum (serialized unquoted).
    #[must_use]
    pub fn enum_variable(mut self, name: impl Into<String>) -> Self {
        self.inner.enum_variables.insert(name.into());
        self
    }

    /// Rename `from` to `to` on the wire.
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.inner
            .remap
            .push((from.into(), RemapRule::Rename(to.into())));
        self
    }

    /// Rewrite `from` with a transform.
    #[must_use]
    pub fn transform<F>(mut self, from: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&str, &Value, &Map<String, Value>) -> Result<RemapPatch, String>
            + Send
            + Sync
            + 'static,
    {
        let transform: RemapFn = std::sync::Arc::new(transform);
        self.inner
            .remap
            .push((from.into(), RemapRule::Transform(transform)));
        self
    }

    /// Mark the query as cursor-paginated.
    #[must_use]
    pub fn paging(mut self, paging: PagingInfo) -> Self {
        self.inner.paging = Some(paging);
        self
    }

    /// Prefer `endpoint` over the client's default endpoint.
    #[must_use]
    pub fn endpoint_override(mut self, endpoint: impl Into<String>) -> Self {
        self.inner.endpoint_override = Some(endpoint.into());
        self
    }

    /// Finish the descriptor.
    #[must_use]
    pub fn build(self) -> QueryDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn template_becomes_shape() {
        let shape = FieldShape::from_template(&json!({
            "id": "",
            "owner": {"address": ""},
            "tags": [{"name": "", "value": ""}],
        }));
        assert_eq!(shape.field("id"), Some(&FieldShape::Scalar));
        assert!(matches!(shape.field("owner"), Some(FieldShape::Object(_))));
        let tags = shape.field("tags").expect("tags");
        assert!(matches!(tags, FieldShape::List(_)));
        assert_eq!(tags.element().field("value"), Some(&FieldShape::Scalar));
        assert_eq!(shape.field("missing"), None);
    }

    #[test]
    fn builder_records_rules_in_order() {
        let descriptor = QueryDescriptor::builder("blocks")
            .fields(&json!({"id": ""}))
            .variable("pageSize", 10)
            .optional("after")
            .enum_variable("sort")
            .rename("pageSize", "first")
            .transform("sort", |key, _, _| {
                Ok(RemapPatch::new().assign(key, "HEIGHT_DESC"))
            })
            .paging(PagingInfo::default().with_limit_variable("pageSize"))
            .build();

        assert_eq!(descriptor.name(), "blocks");
        assert!(descriptor.declares("after"));
        assert!(descriptor.is_enum("sort"));
        let keys: Vec<_> = descriptor
            .remap_rules()
            .iter()
            .map(|(key, _)| key.as_str())
            .collect();
        assert_eq!(keys, ["pageSize", "sort"]);
        assert_eq!(
            descriptor
                .paging()
                .and_then(|paging| paging.limit_variable.as_deref()),
            Some("pageSize")
        );
    }
}

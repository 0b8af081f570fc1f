//! Named descriptor lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::QueryDescriptor;
use super::catalog;
use crate::error::QueryError;

/// Names a declared variable may not use.
///
/// These are the [`Query`](crate::Query) builder and iteration methods plus
/// the short forms callers use for them; a variable with one of these names
/// would be indistinguishable from the method that shares it. Descriptors
/// that need such a variable on the wire declare a different caller-facing
/// name and add a rename rule.
pub const RESERVED_NAMES: &[&str] = &[
    "all",
    "all_as",
    "build_text",
    "descriptor",
    "endpoint",
    "execute",
    "fetch_page",
    "fields",
    "first",
    "first_as",
    "has_next_page",
    "into_stream",
    "limit",
    "limit_pages",
    "limit_results",
    "limits",
    "name",
    "page_size",
    "query",
    "raw_query",
    "search",
    "select_fields",
    "select_fields_unchecked",
    "set_variable",
    "set_variables",
    "spawn_stream",
    "tracker",
    "variables",
];

/// Per-search overrides.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Use this descriptor instead of the registered one.
    pub descriptor: Option<QueryDescriptor>,
    /// Skip the reserved-name check on `descriptor`.
    pub skip_setter_check: bool,
    /// Accept variables the descriptor does not declare.
    pub allow_undeclared_variables: bool,
}

impl SearchOptions {
    /// Options supplying an ad-hoc descriptor.
    #[must_use]
    pub fn with_descriptor(descriptor: QueryDescriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
            ..Self::default()
        }
    }
}

/// Registry of query descriptors keyed by search name.
///
/// Names follow a `<network>:<query>` convention; older schema shapes are
/// registered under `<name>@v<version>`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, Arc<QueryDescriptor>>,
}

impl SchemaRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in Irys and Arweave queries.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, descriptor) in catalog::builtin() {
            registry.register_unchecked(name, descriptor);
        }
        registry
    }

    /// Register `descriptor` under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        descriptor: QueryDescriptor,
    ) -> Result<(), QueryError> {
        check_descriptor(&descriptor)?;
        self.register_unchecked(name, descriptor);
        Ok(())
    }

    /// Register without the reserved-name check.
    pub fn register_unchecked(&mut self, name: impl Into<String>, descriptor: QueryDescriptor) {
        let name = name.into();
        debug!(search = %name, query = descriptor.name(), version = descriptor.version(), "registered query");
        self.entries.insert(name, Arc::new(descriptor));
    }

    /// Descriptor registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<QueryDescriptor>, QueryError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnknownQuery {
                name: name.to_owned(),
            })
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Validate a descriptor before it is used for searches.
///
/// Fails when the query name is empty or a declared variable uses one of
/// [`RESERVED_NAMES`].
pub fn check_descriptor(descriptor: &QueryDescriptor) -> Result<(), QueryError> {
    if descriptor.name().is_empty() {
        return Err(QueryError::configuration("query name is undefined"));
    }
    if let Some(name) = descriptor
        .variables()
        .keys()
        .find(|name| RESERVED_NAMES.contains(&name.as_str()))
    {
        return Err(QueryError::SetterConflict { name: name.clone() });
    }
    Ok(())
}

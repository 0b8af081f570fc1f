//! Query text construction.

use std::fmt::Write as _;

use crate::error::QueryError;
use crate::remap::apply_remap;
use crate::schema::QueryDescriptor;
use crate::selection::FieldSelection;
use crate::variables::{VariableSet, render_arguments};

/// Build the GraphQL text for one page request.
///
/// Variables are merged over the descriptor defaults, remapped, then inlined
/// into the argument list. Paged descriptors wrap the selection in an
/// `edges`/`pageInfo` connection.
pub fn build_query_text(
    descriptor: &QueryDescriptor,
    selection: &FieldSelection,
    variables: &VariableSet,
) -> Result<String, QueryError> {
    let name = descriptor.name();
    if name.is_empty() {
        return Err(QueryError::configuration("query name is undefined"));
    }

    let merged = variables.merged_over(descriptor.variables());
    let remapped = apply_remap(merged, descriptor.remap_rules())?;
    let arguments = render_arguments(&remapped, |key| descriptor.is_enum(key));

    let mut call = name.to_owned();
    if !arguments.is_empty() {
        let _ = write!(call, "({arguments})");
    }

    let text = match descriptor.paging() {
        Some(paging) => {
            let node = selection
                .render(6)
                .ok_or_else(|| no_fields_selected(name))?;
            format!(
                "query {{\n  {call} {{\n    edges {{\n      {cursor}\n      node {node}\n    }}\n    pageInfo {{\n      {has_next}\n    }}\n  }}\n}}",
                cursor = paging.cursor,
                has_next = paging.has_next_page,
            )
        }
        None => {
            let fields = selection
                .render(2)
                .ok_or_else(|| no_fields_selected(name))?;
            format!("query {{\n  {call} {fields}\n}}")
        }
    };
    Ok(text)
}

fn no_fields_selected(name: &str) -> QueryError {
    QueryError::configuration(format!("no fields selected for query {name}"))
}

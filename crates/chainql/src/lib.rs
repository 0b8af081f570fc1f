//! chainql - parameterized GraphQL queries against blockchain indexers.
//!
//! This crate provides:
//! - A registry of named query descriptors for Irys and Arweave indexers.
//! - Field selection and variable remapping with inline GraphQL text building.
//! - Cursor-paginated execution with retry, backoff and result limits.
//! - Result iteration as pages, collected vectors or async streams.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]

mod builder;
mod client;
mod config;
mod error;
mod governor;
mod query;
mod remap;
mod retry;
mod schema;
mod selection;
mod transport;
mod variables;

pub use builder::build_query_text;
pub use client::{ClientMetrics, ClientMetricsSnapshot, QueryClient, QueryClientBuilder};
pub use config::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_RESULT_LIMIT, RetryConfig};
pub use error::{GraphqlError, GraphqlErrorLocation, GraphqlPathSegment, HttpErrorInfo, QueryError};
pub use governor::{ResultGovernor, ResultLimits, ResultTracker};
pub use query::{CURSOR_VARIABLE, MAX_FLATTEN_DEPTH, Query};
pub use remap::{RemapFn, RemapPatch, RemapRule, apply_remap};
pub use retry::{RetryDecision, RetryPolicy};
pub use schema::{
    FieldShape, PagingInfo, QueryDescriptor, QueryDescriptorBuilder, RESERVED_NAMES,
    SchemaRegistry, SearchOptions, check_descriptor, parse_timestamp,
};
pub use selection::FieldSelection;
pub use transport::{GraphqlRequest, GraphqlResponse, HttpTransport, Transport};
pub use variables::{VariableSet, render_arguments};

//! Error types for query construction and execution.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP error information captured from reqwest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// Error message.
    pub message: String,
    /// HTTP status code (if available).
    pub status_code: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status().map(|status| status.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the query (1-based).
    pub line: u32,
    /// Column number in the query (1-based).
    pub column: u32,
}

/// GraphQL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Field name.
    Key(String),
    /// Array index.
    Index(i64),
}

/// GraphQL error as returned in a response `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the query.
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Error type for every query operation.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Client or descriptor misconfiguration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details.
        message: String,
    },

    /// No descriptor is registered under the requested name.
    #[error("unable to find query with name {name}")]
    UnknownQuery {
        /// Requested query name.
        name: String,
    },

    /// A selected field path is not part of the descriptor's field shape.
    #[error("illegal field {path}")]
    IllegalField {
        /// Dotted path of the offending field.
        path: String,
    },

    /// A declared variable name shadows a builder method.
    #[error(
        "variable {name} conflicts with a builder method; rename it and add a remap rule"
    )]
    SetterConflict {
        /// Conflicting variable name.
        name: String,
    },

    /// A variable was set that the descriptor does not declare.
    #[error("query {query} has no variable named {name}")]
    UnknownVariable {
        /// Query name.
        query: String,
        /// Variable name.
        name: String,
    },

    /// A remap transform rejected a variable value.
    #[error("invalid value for variable {variable}: {message}")]
    Transform {
        /// Source variable name.
        variable: String,
        /// Reason reported by the transform.
        message: String,
    },

    /// HTTP/network error.
    #[error("HTTP error: {}", .0.message)]
    Http(HttpErrorInfo),

    /// HTTP response status error.
    #[error("HTTP status {status} with body: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: StatusCode,
        /// Response body (truncated if needed).
        body: String,
        /// Retry-After duration when supplied.
        retry_after: Option<Duration>,
    },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(String),

    /// GraphQL-level errors returned by the server.
    #[error("GraphQL errors: {}", summarize(.errors))]
    GraphqlErrors {
        /// GraphQL error list.
        errors: Vec<GraphqlError>,
    },

    /// Response did not have the expected shape.
    #[error("GraphQL protocol error: {message}")]
    Protocol {
        /// Details.
        message: String,
    },

    /// A page fetch failed; carries the query text that was attempted.
    #[error("error running query after {attempts} attempt(s): {source}\n{query}")]
    Execution {
        /// Query text sent to the endpoint.
        query: String,
        /// Number of attempts made.
        attempts: usize,
        /// Last underlying failure.
        #[source]
        source: Box<QueryError>,
    },
}

fn summarize(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpErrorInfo::from(err))
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl QueryError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if a page fetch failing with this error may be retried.
    ///
    /// Only transport failures and error responses qualify. Build errors and
    /// responses with an unexpected shape are final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::HttpStatus { .. } | Self::Json(_) | Self::GraphqlErrors { .. }
        )
    }

    /// Query text attached to an execution failure.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Execution { query, .. } => Some(query),
            _ => None,
        }
    }

    /// Server-requested delay, if the failure carried one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

//! Transport abstraction and the HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphqlError, QueryError};

/// GraphQL request payload.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest<'a> {
    /// Query text.
    pub query: &'a str,
}

/// GraphQL response container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T> {
    /// Response data.
    #[serde(default)]
    pub data: Option<T>,
    /// GraphQL errors.
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    /// Extensions payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl<T> GraphqlResponse<T> {
    /// Returns `true` if no GraphQL errors were returned.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Data payload, failing on GraphQL errors or missing data.
    pub fn into_data(self) -> Result<T, QueryError> {
        if !self.errors.is_empty() {
            return Err(QueryError::GraphqlErrors {
                errors: self.errors,
            });
        }
        self.data
            .ok_or_else(|| QueryError::protocol("missing GraphQL data"))
    }
}

/// Sends one query and returns the decoded response.
///
/// Implementations make a single attempt; retry and `errors` handling belong
/// to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `query` to `endpoint`.
    async fn send(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<GraphqlResponse<serde_json::Value>, QueryError>;
}

/// [`Transport`] over HTTP using reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with default headers and timeout.
    pub fn new(timeout: Duration) -> Result<Self, QueryError> {
        Self::with_headers(HeaderMap::new(), timeout)
    }

    /// Create a transport sending `headers` on every request.
    pub fn with_headers(mut headers: HeaderMap, timeout: Duration) -> Result<Self, QueryError> {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub const fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<GraphqlResponse<serde_json::Value>, QueryError> {
        let response = self
            .http
            .post(endpoint)
            .json(&GraphqlRequest { query })
            .send()
            .await?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await?;

        if !status.is_success() {
            debug!(%status, "GraphQL endpoint returned an error status");
            return Err(QueryError::HttpStatus {
                status,
                body: truncate_body(&bytes),
                retry_after,
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Build a header map from name/value pairs, skipping invalid entries.
pub(crate) fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_str(value).ok()?;
    Some((name, value))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(RETRY_AFTER)?;
    let value = header.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

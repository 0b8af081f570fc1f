//! Query client: configuration, shared transport and query factory.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::QueryError;
use crate::governor::ResultLimits;
use crate::query::{Context, Query};
use crate::retry::RetryPolicy;
use crate::schema::{SchemaRegistry, SearchOptions, check_descriptor};
use crate::transport::{HttpTransport, Transport, header_pair};

/// Request counters shared by every query of one client.
#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
pub struct ClientMetrics {
    pub(crate) requests_total: AtomicU64,
    pub(crate) requests_success: AtomicU64,
    pub(crate) requests_error: AtomicU64,
    pub(crate) requests_retried: AtomicU64,
    pub(crate) pages: AtomicU64,
}

impl ClientMetrics {
    /// Snapshot current metrics.
    #[must_use]
    pub fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_error: self.requests_error.load(Ordering::Relaxed),
            requests_retried: self.requests_retried.load(Ordering::Relaxed),
            pages: self.pages.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_field_names)]
pub struct ClientMetricsSnapshot {
    /// Request attempts sent.
    pub requests_total: u64,
    /// Attempts that returned data.
    pub requests_success: u64,
    /// Attempts that failed.
    pub requests_error: u64,
    /// Retries performed.
    pub requests_retried: u64,
    /// Pages admitted.
    pub pages: u64,
}

/// Builder for [`QueryClient`].
pub struct QueryClientBuilder {
    config: ClientConfig,
    headers: HeaderMap,
    retry: Option<RetryPolicy>,
    registry: Option<SchemaRegistry>,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for QueryClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClientBuilder")
            .field("config", &self.config)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("retry", &self.retry)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl QueryClientBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(endpoint))
    }

    /// Start from a loaded configuration.
    #[must_use]
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            headers: HeaderMap::new(),
            retry: None,
            registry: None,
            transport: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a header from strings; invalid names or values are ignored.
    #[must_use]
    pub fn with_raw_header(mut self, name: &str, value: &str) -> Self {
        match header_pair(name, value) {
            Some((name, value)) => {
                self.headers.insert(name, value);
            }
            None => debug!(header = name, "ignoring invalid header"),
        }
        self
    }

    /// Add a bearer token header.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        if let Ok(header) = HeaderValue::from_str(&value) {
            self.headers.insert(AUTHORIZATION, header);
        }
        self
    }

    /// Set timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set retry policy, overriding the configured one.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Default page limit for new queries.
    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = Some(max_pages);
        self
    }

    /// Default result limit for new queries.
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    /// Use `registry` instead of the built-in one.
    #[must_use]
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Send requests through `transport` instead of HTTP.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<QueryClient, QueryError> {
        validate_endpoint(&self.config.endpoint)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_headers(
                self.headers,
                self.config.timeout,
            )?),
        };
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from(&self.config.retry));
        Ok(QueryClient {
            config: self.config,
            retry,
            registry: Arc::new(self.registry.unwrap_or_else(SchemaRegistry::builtin)),
            transport,
            metrics: Arc::new(ClientMetrics::default()),
        })
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), QueryError> {
    if endpoint.trim().is_empty() {
        return Err(QueryError::configuration("missing endpoint"));
    }
    let url = Url::parse(endpoint)
        .map_err(|err| QueryError::configuration(format!("invalid endpoint {endpoint}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(QueryError::configuration(format!(
            "unsupported endpoint scheme {}",
            url.scheme()
        )));
    }
    Ok(())
}

/// Entry point for searches.
///
/// Cheap to clone; clones share the transport, registry and metrics.
#[derive(Clone)]
pub struct QueryClient {
    config: ClientConfig,
    retry: RetryPolicy,
    registry: Arc<SchemaRegistry>,
    transport: Arc<dyn Transport>,
    metrics: Arc<ClientMetrics>,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("endpoint", &self.config.endpoint)
            .field("retry", &self.retry)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Client with an HTTP transport and the built-in registry.
    pub fn new(config: ClientConfig) -> Result<Self, QueryError> {
        QueryClientBuilder::from_config(config).build()
    }

    /// Start building a client for `endpoint`.
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> QueryClientBuilder {
        QueryClientBuilder::new(endpoint)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Registry used by [`search`](Self::search).
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Request counters.
    #[must_use]
    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// New query for the registered search `name`.
    pub fn search(&self, name: &str) -> Result<Query, QueryError> {
        self.search_with(name, SearchOptions::default())
    }

    /// New query for `name`, with per-search overrides.
    ///
    /// A descriptor in `options` replaces the registered one and is checked
    /// unless `skip_setter_check` is set.
    pub fn search_with(&self, name: &str, options: SearchOptions) -> Result<Query, QueryError> {
        let descriptor = match options.descriptor {
            Some(descriptor) => {
                if options.skip_setter_check {
                    if descriptor.name().is_empty() {
                        return Err(QueryError::configuration("query name is undefined"));
                    }
                } else {
                    check_descriptor(&descriptor)?;
                }
                Arc::new(descriptor)
            }
            None => self.registry.get(name)?,
        };

        let endpoint = match descriptor.endpoint_override() {
            Some(endpoint) if self.config.uses_default_endpoint() => endpoint.to_owned(),
            _ => self.config.endpoint.clone(),
        };
        debug!(search = name, %endpoint, "new query");
        Ok(Query::from_descriptor(
            self.context(endpoint),
            descriptor,
            !options.allow_undeclared_variables,
        ))
    }

    /// New query sending `text` verbatim.
    #[must_use]
    pub fn raw_query(&self, text: impl Into<String>) -> Query {
        Query::from_text(self.context(self.config.endpoint.clone()), text.into())
    }

    fn context(&self, endpoint: String) -> Context {
        Context {
            transport: Arc::clone(&self.transport),
            endpoint,
            retry: self.retry.clone(),
            limits: ResultLimits {
                max_pages: self.config.max_pages,
                max_results: self.config.max_results,
            },
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ENDPOINT;

    #[test]
    fn empty_endpoint_is_rejected() {
        let err = QueryClientBuilder::new("  ").build().expect_err("empty");
        assert!(matches!(err, QueryError::Configuration { ref message } if message == "missing endpoint"));
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        assert!(QueryClientBuilder::new("not a url").build().is_err());
        assert!(QueryClientBuilder::new("ftp://example.com/graphql")
            .build()
            .is_err());
    }

    #[test]
    fn arweave_queries_switch_endpoint_only_from_default() {
        let client = QueryClient::new(ClientConfig::default()).expect("client");
        let query = client.search("arweave:blocks").expect("query");
        assert_eq!(query.endpoint(), "https://arweave.net/graphql");
        let query = client.search("irys:transactions").expect("query");
        assert_eq!(query.endpoint(), DEFAULT_ENDPOINT);

        let client = QueryClient::builder("https://indexer.example/graphql")
            .build()
            .expect("client");
        let query = client.search("arweave:blocks").expect("query");
        assert_eq!(query.endpoint(), "https://indexer.example/graphql");
    }

    #[test]
    fn client_limits_become_query_defaults() {
        let client = QueryClient::builder("https://indexer.example/graphql")
            .with_max_pages(3)
            .with_max_results(50)
            .build()
            .expect("client");
        let limits = client.search("irys:transactions").expect("query").limits();
        assert_eq!(
            limits,
            ResultLimits {
                max_pages: Some(3),
                max_results: 50
            }
        );
    }

    #[test]
    fn unknown_search_name_fails() {
        let client = QueryClient::new(ClientConfig::default()).expect("client");
        let err = client.search("irys:unknown").expect_err("unknown");
        assert!(matches!(err, QueryError::UnknownQuery { ref name } if name == "irys:unknown"));
    }

    #[test]
    fn metrics_start_at_zero() {
        let client = QueryClient::new(ClientConfig::default()).expect("client");
        assert_eq!(client.metrics().snapshot(), ClientMetricsSnapshot::default());
    }
}

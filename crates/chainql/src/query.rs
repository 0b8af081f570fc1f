//! Query instances: builder surface, page execution and result iteration.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::builder::build_query_text;
use crate::client::ClientMetrics;
use crate::error::QueryError;
use crate::governor::{ResultGovernor, ResultLimits, ResultTracker};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::schema::QueryDescriptor;
use crate::selection::FieldSelection;
use crate::transport::Transport;
use crate::variables::VariableSet;

/// Maximum array nesting flattened out of raw or unpaged responses.
pub const MAX_FLATTEN_DEPTH: usize = 20;

/// Variable carrying the cursor of the next page.
pub const CURSOR_VARIABLE: &str = "after";

enum Source {
    Descriptor {
        descriptor: Arc<QueryDescriptor>,
        selection: FieldSelection,
    },
    Raw(String),
}

/// Shared execution context handed out by the client.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) endpoint: String,
    pub(crate) retry: RetryPolicy,
    pub(crate) limits: ResultLimits,
    pub(crate) metrics: Arc<ClientMetrics>,
}

/// One search against an indexer.
///
/// Built from a [`QueryDescriptor`] (or raw text), configured through the
/// builder methods, then consumed page by page. A query keeps its paging
/// state, so a second, unrelated search needs a new instance.
pub struct Query {
    ctx: Context,
    source: Source,
    variables: VariableSet,
    strict_variables: bool,
    governor: ResultGovernor,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name())
            .field("endpoint", &self.ctx.endpoint)
            .field("variables", &self.variables)
            .field("tracker", &self.governor.tracker())
            .finish_non_exhaustive()
    }
}

impl Query {
    pub(crate) fn from_descriptor(
        ctx: Context,
        descriptor: Arc<QueryDescriptor>,
        strict_variables: bool,
    ) -> Self {
        let selection = FieldSelection::from_shape(descriptor.fields());
        let governor = ResultGovernor::new(ctx.limits);
        Self {
            ctx,
            source: Source::Descriptor {
                descriptor,
                selection,
            },
            variables: VariableSet::new(),
            strict_variables,
            governor,
        }
    }

    pub(crate) fn from_text(ctx: Context, text: String) -> Self {
        let governor = ResultGovernor::new(ctx.limits);
        Self {
            ctx,
            source: Source::Raw(text),
            variables: VariableSet::new(),
            strict_variables: false,
            governor,
        }
    }

    /// GraphQL query name, or `"raw"` for user-provided text.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.source {
            Source::Descriptor { descriptor, .. } => descriptor.name(),
            Source::Raw(_) => "raw",
        }
    }

    /// Descriptor this query was built from.
    #[must_use]
    pub fn descriptor(&self) -> Option<&QueryDescriptor> {
        match &self.source {
            Source::Descriptor { descriptor, .. } => Some(descriptor),
            Source::Raw(_) => None,
        }
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.ctx.endpoint
    }

    /// Variables set by the caller (and the current cursor).
    #[must_use]
    pub const fn variables(&self) -> &VariableSet {
        &self.variables
    }

    /// Page and result totals so far.
    #[must_use]
    pub const fn tracker(&self) -> ResultTracker {
        self.governor.tracker()
    }

    /// Active limits.
    #[must_use]
    pub const fn limits(&self) -> ResultLimits {
        self.governor.limits()
    }

    /// Effective page size, from the descriptor's page-size variable.
    #[must_use]
    pub fn page_size(&self) -> Option<u64> {
        let descriptor = self.descriptor()?;
        let name = descriptor.paging()?.limit_variable.as_deref()?;
        self.variables
            .get(name)
            .or_else(|| descriptor.variables().get(name))
            .and_then(Value::as_u64)
    }

    /// Restrict the returned fields, validating paths against the descriptor.
    pub fn select_fields(self, selection: impl Into<FieldSelection>) -> Result<Self, QueryError> {
        self.replace_selection(selection.into(), true)
    }

    /// Restrict the returned fields without validating paths.
    ///
    /// Unknown fields are sent as selected and left for the server to reject.
    pub fn select_fields_unchecked(
        self,
        selection: impl Into<FieldSelection>,
    ) -> Result<Self, QueryError> {
        self.replace_selection(selection.into(), false)
    }

    fn replace_selection(
        mut self,
        selection: FieldSelection,
        validate: bool,
    ) -> Result<Self, QueryError> {
        match &mut self.source {
            Source::Descriptor {
                descriptor,
                selection: active,
            } => {
                if validate {
                    selection.validate(descriptor.fields())?;
                }
                *active = selection;
            }
            Source::Raw(_) => return Err(raw_has_no_schema("select fields")),
        }
        Ok(self)
    }

    /// Set one variable by its caller-facing name.
    pub fn set_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        let name = name.into();
        self.check_variable(&name)?;
        self.variables.set(name, value);
        Ok(self)
    }

    /// Replace all caller-set variables.
    pub fn set_variables(mut self, variables: Map<String, Value>) -> Result<Self, QueryError> {
        for name in variables.keys() {
            self.check_variable(name)?;
        }
        self.variables = VariableSet::from(variables);
        Ok(self)
    }

    /// Stop once `max_results` results have been returned.
    #[must_use]
    pub fn limit_results(mut self, max_results: usize) -> Self {
        let limits = ResultLimits {
            max_results,
            ..self.governor.limits()
        };
        self.governor.set_limits(limits);
        self
    }

    /// Stop after `max_pages` pages.
    #[must_use]
    pub fn limit_pages(mut self, max_pages: usize) -> Self {
        let limits = ResultLimits {
            max_pages: Some(max_pages),
            ..self.governor.limits()
        };
        self.governor.set_limits(limits);
        self
    }

    /// Replace the query with user-provided text.
    ///
    /// Raw text is sent as-is: no variables, no field selection and no
    /// cursor tracking.
    #[must_use]
    pub fn raw_query(mut self, text: impl Into<String>) -> Self {
        self.source = Source::Raw(text.into());
        self.strict_variables = false;
        self
    }

    /// Build the text the next page request will send.
    pub fn build_text(&self) -> Result<String, QueryError> {
        match &self.source {
            Source::Descriptor {
                descriptor,
                selection,
            } => build_query_text(descriptor, selection, &self.variables),
            Source::Raw(text) => Ok(text.clone()),
        }
    }

    /// Whether another page request would be made by the iterators.
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        !self.governor.is_done()
            && self.descriptor().is_some_and(|d| d.paging().is_some())
            && self.variables.is_set(CURSOR_VARIABLE)
    }

    /// Fetch and admit the next page.
    ///
    /// Returns `None` without any request once the query is done.
    #[instrument(level = "debug", skip(self), fields(query = %self.name()))]
    pub async fn fetch_page(&mut self) -> Result<Option<Vec<Value>>, QueryError> {
        if self.governor.is_done() {
            return Ok(None);
        }
        let text = self.build_text()?;
        let Page { items, cursor } = self.send_with_retry(&text).await?;
        match cursor {
            Some(Some(cursor)) => self.variables.set(CURSOR_VARIABLE, cursor),
            Some(None) => {
                self.variables.remove(CURSOR_VARIABLE);
            }
            None => {}
        }
        let fetched = items.len();
        let page = self.governor.admit(items);
        self.ctx.metrics.pages.fetch_add(1, Ordering::Relaxed);
        debug!(
            fetched,
            admitted = page.len(),
            done = self.governor.is_done(),
            "admitted page"
        );
        Ok(Some(page))
    }

    /// First result of the first page.
    pub async fn first(&mut self) -> Result<Option<Value>, QueryError> {
        Ok(self
            .fetch_page()
            .await?
            .and_then(|page| page.into_iter().next()))
    }

    /// First result, deserialized.
    pub async fn first_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>, QueryError> {
        match self.first().await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Every remaining result, following cursors until exhausted or limited.
    pub async fn all(&mut self) -> Result<Vec<Value>, QueryError> {
        let mut results = Vec::new();
        while let Some(page) = self.fetch_page().await? {
            results.extend(page);
            if !self.has_next_page() {
                break;
            }
        }
        Ok(results)
    }

    /// Every remaining result, deserialized.
    pub async fn all_as<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, QueryError> {
        self.all()
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(QueryError::from))
            .collect()
    }

    /// Run the query to completion.
    pub async fn execute(mut self) -> Result<Vec<Value>, QueryError> {
        self.all().await
    }

    /// Lazily yield results one by one, fetching pages on demand.
    ///
    /// The stream ends after the last page, at a limit, or after yielding the
    /// first error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Value, QueryError>> + Send {
        async_stream::stream! {
            loop {
                match self.fetch_page().await {
                    Ok(Some(page)) => {
                        for item in page {
                            yield Ok(item);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
                if !self.has_next_page() {
                    break;
                }
            }
        }
    }

    /// Fetch in a background task, pushing results into a bounded channel.
    ///
    /// Dropping the returned stream stops further page requests.
    pub fn spawn_stream(self, buffer: usize) -> ReceiverStream<Result<Value, QueryError>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            let stream = self.into_stream();
            futures_util::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        ReceiverStream::new(rx)
    }

    fn check_variable(&self, name: &str) -> Result<(), QueryError> {
        match &self.source {
            Source::Raw(_) => Err(raw_has_no_schema("set variables")),
            Source::Descriptor { descriptor, .. } => {
                if self.strict_variables && !descriptor.declares(name) && name != CURSOR_VARIABLE {
                    return Err(QueryError::UnknownVariable {
                        query: descriptor.name().to_owned(),
                        name: name.to_owned(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn send_with_retry(&self, text: &str) -> Result<Page, QueryError> {
        let metrics = &self.ctx.metrics;
        let mut attempt = 1;
        loop {
            metrics.requests_total.fetch_add(1, Ordering::Relaxed);
            let result = self
                .ctx
                .transport
                .send(&self.ctx.endpoint, text)
                .await
                .and_then(|response| response.into_data())
                .and_then(|data| self.unwrap_page(data));
            match result {
                Ok(page) => {
                    metrics.requests_success.fetch_add(1, Ordering::Relaxed);
                    return Ok(page);
                }
                Err(err) => {
                    metrics.requests_error.fetch_add(1, Ordering::Relaxed);
                    match self.ctx.retry.decide(&err, attempt) {
                        RetryDecision::RetryAfter(delay) => {
                            metrics.requests_retried.fetch_add(1, Ordering::Relaxed);
                            warn!(attempt, ?delay, error = %err, "retrying page request");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        RetryDecision::DoNotRetry => {
                            return Err(QueryError::Execution {
                                query: text.to_owned(),
                                attempts: attempt,
                                source: Box::new(err),
                            });
                        }
                    }
                }
            }
        }
    }

    fn unwrap_page(&self, mut data: Value) -> Result<Page, QueryError> {
        let descriptor = match &self.source {
            Source::Raw(_) => return Ok(Page::unpaged(flatten(data))),
            Source::Descriptor { descriptor, .. } => descriptor,
        };
        let name = descriptor.name();
        let result = data
            .get_mut(name)
            .map(Value::take)
            .ok_or_else(|| QueryError::protocol(format!("response is missing `{name}`")))?;

        let Some(paging) = descriptor.paging() else {
            return Ok(Page::unpaged(if result.is_null() {
                Vec::new()
            } else {
                flatten(result)
            }));
        };

        let Value::Object(mut connection) = result else {
            return Err(QueryError::protocol(format!(
                "`{name}` is not a connection object"
            )));
        };
        let has_next = connection
            .get("pageInfo")
            .and_then(|info| info.get(&paging.has_next_page))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let edges = match connection.shift_remove("edges") {
            Some(Value::Array(edges)) => edges,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(QueryError::protocol(format!(
                    "`{name}.edges` is not a list"
                )));
            }
        };

        let cursor = if has_next {
            edges
                .last()
                .and_then(|edge| edge.get(&paging.cursor))
                .filter(|cursor| !cursor.is_null())
                .cloned()
        } else {
            None
        };
        let items = edges
            .into_iter()
            .map(|mut edge| edge.get_mut("node").map(Value::take).unwrap_or(Value::Null))
            .collect();
        Ok(Page {
            items,
            cursor: Some(cursor),
        })
    }
}

/// One unwrapped response.
struct Page {
    items: Vec<Value>,
    /// Next cursor for paged queries (`Some(None)` clears it).
    cursor: Option<Option<Value>>,
}

impl Page {
    const fn unpaged(items: Vec<Value>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }
}

fn raw_has_no_schema(action: &str) -> QueryError {
    QueryError::configuration(format!("cannot {action} on a raw query"))
}

/// Flatten nested arrays into a page, down to [`MAX_FLATTEN_DEPTH`] levels.
fn flatten(value: Value) -> Vec<Value> {
    let mut out = Vec::new();
    flatten_into(value, MAX_FLATTEN_DEPTH, &mut out);
    out
}

fn flatten_into(value: Value, depth: usize, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) if depth > 0 => {
            for item in items {
                flatten_into(item, depth - 1, out);
            }
        }
        other => out.push(other),
    }
}

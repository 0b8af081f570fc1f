//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chainql::{QueryClient, RetryPolicy};
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Uses `RUST_LOG` when set, otherwise `info,chainql=debug`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,chainql=debug"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .compact(),
            )
            .init();
    });
}

/// Retry policy with millisecond delays.
pub fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_jitter: Duration::ZERO,
    }
}

/// Client pointed at the mock server root.
pub fn client(server: &MockServer, retry: RetryPolicy) -> QueryClient {
    QueryClient::builder(server.uri())
        .with_retry_policy(retry)
        .build()
        .expect("client")
}

/// A `transactions` connection page with `count` nodes numbered from `start`.
pub fn transactions_page(start: usize, count: usize, has_next: bool) -> Value {
    connection("transactions", start, count, has_next)
}

/// A connection page for `name`.
pub fn connection(name: &str, start: usize, count: usize, has_next: bool) -> Value {
    let edges: Vec<Value> = (start..start + count)
        .map(|n| json!({"cursor": format!("cursor-{n}"), "node": {"id": format!("tx-{n}")}}))
        .collect();
    json!({
        "data": {
            name: {
                "edges": edges,
                "pageInfo": {"hasNextPage": has_next}
            }
        }
    })
}

/// Query text from a captured request body.
pub fn request_query(request: &Request) -> String {
    let body: Value = serde_json::from_slice(&request.body).expect("request body");
    body["query"].as_str().expect("query field").to_owned()
}

/// Replies with successive bodies, repeating the last one, and counts calls.
pub struct SequenceResponder {
    pub counter: Arc<AtomicUsize>,
    pub responses: Vec<ResponseTemplate>,
}

impl SequenceResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> (Self, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        (
            Self {
                counter: Arc::clone(&counter),
                responses,
            },
            counter,
        )
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let attempt = self.counter.fetch_add(1, Ordering::SeqCst);
        let idx = attempt.min(self.responses.len().saturating_sub(1));
        self.responses[idx].clone()
    }
}

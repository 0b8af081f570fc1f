//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Endpoint used when none is configured explicitly.
pub const DEFAULT_ENDPOINT: &str = "https://node1.bundlr.network/graphql";

/// Result limit applied to queries that never call `limit_results`.
pub const DEFAULT_RESULT_LIMIT: usize = 1_000;

/// Configuration for a [`QueryClient`](crate::QueryClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// GraphQL endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_ms")]
    pub timeout: Duration,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Page limit for new queries (`None` = unbounded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,

    /// Result limit for new queries.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_results() -> usize {
    DEFAULT_RESULT_LIMIT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            retry: RetryConfig::default(),
            max_pages: None,
            max_results: default_max_results(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `endpoint`, all other settings default.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Whether the endpoint is still the built-in default.
    #[must_use]
    pub fn uses_default_endpoint(&self) -> bool {
        self.endpoint.trim_end_matches('/') == DEFAULT_ENDPOINT
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Maximum random jitter in milliseconds
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

const fn default_retries() -> usize {
    3
}

const fn default_min_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    2_000
}

const fn default_jitter_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.retries.saturating_add(1),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
            max_jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"endpoint": "https://arweave.net/graphql"}"#)
                .expect("config");
        assert_eq!(config.endpoint, "https://arweave.net/graphql");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_results, DEFAULT_RESULT_LIMIT);
        assert_eq!(config.max_pages, None);
        assert_eq!(config.retry, RetryConfig::default());
        assert!(!config.uses_default_endpoint());
    }

    #[test]
    fn retry_config_converts_to_policy() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"retries": 1, "min_delay_ms": 10, "max_delay_ms": 5}"#)
                .expect("retry config");
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.min_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(10));
        assert_eq!(policy.max_jitter, Duration::from_millis(100));
    }

    #[test]
    fn timeout_round_trips_in_millis() {
        let config = ClientConfig {
            timeout: Duration::from_millis(1_500),
            ..ClientConfig::default()
        };
        let value = serde_json::to_value(&config).expect("serialize");
        assert_eq!(value["timeout"], 1_500);
        assert!(ClientConfig::default().uses_default_endpoint());
    }
}

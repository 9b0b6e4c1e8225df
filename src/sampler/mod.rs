//! Sample acquisition
//!
//! One call per tick against a Prometheus-compatible HTTP API. The contract
//! is intentionally small: the latest value of the configured query, or an
//! explicit "no value" when the query matched nothing. Everything else
//! (timeouts, degraded-input substitution) belongs to the control loop.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from one sampling attempt. All are recovered locally by the loop:
/// logged, tick skipped, next interval proceeds.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Query request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Produces the latest signal value, or `None` when the backend has no data
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self) -> Result<Option<f64>, SampleError>;

    /// The query this sampler evaluates, for log context
    fn query(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    // [ <unix time>, "<value string>" ]
    value: (f64, String),
}

/// Instant-query client against `/api/v1/query`
pub struct PrometheusSampler {
    client: reqwest::Client,
    endpoint: String,
    query: String,
}

impl PrometheusSampler {
    /// Build the query string from a metric name and optional label filters,
    /// e.g. `fs_usage` + `mount="/data"` -> `fs_usage{mount="/data"}`
    pub fn build_query(metric_name: &str, label_filters: &str) -> String {
        if label_filters.is_empty() {
            metric_name.to_string()
        } else {
            format!("{}{{{}}}", metric_name, label_filters)
        }
    }

    pub fn new(endpoint: String, query: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            query,
        }
    }

    fn parse(&self, body: QueryResponse) -> Result<Option<f64>, SampleError> {
        if body.status != "success" {
            return Err(SampleError::Malformed(
                body.error.unwrap_or_else(|| format!("query status: {}", body.status)),
            ));
        }

        if !body.warnings.is_empty() {
            warn!(query = %self.query, warnings = ?body.warnings, "query returned warnings");
        }

        let data = body
            .data
            .ok_or_else(|| SampleError::Malformed("success response without data".to_string()))?;

        if data.result_type != "vector" {
            return Err(SampleError::Malformed(format!(
                "unexpected result type: {}",
                data.result_type
            )));
        }

        let Some(sample) = data.result.first() else {
            debug!(query = %self.query, "no data found for metric");
            return Ok(None);
        };

        let value = sample
            .value
            .1
            .parse::<f64>()
            .map_err(|e| SampleError::Malformed(format!("non-numeric sample value {:?}: {}", sample.value.1, e)))?;

        Ok(Some(value))
    }
}

#[async_trait]
impl Sampler for PrometheusSampler {
    async fn sample(&self) -> Result<Option<f64>, SampleError> {
        let url = format!("{}/api/v1/query", self.endpoint.trim_end_matches('/'));

        let response = self.client.get(&url).query(&[("query", self.query.as_str())]).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SampleError::Backend {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| SampleError::Malformed(format!("invalid JSON: {}", e)))?;

        self.parse(body)
    }

    fn query(&self) -> &str {
        &self.query
    }
}

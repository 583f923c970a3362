//! TSDB-facing HTTP client (the backend half of C5).

use crate::error::{BackendError, Result};
use crate::keys::MetricQuery;
use crate::types::{BackendErrorBody, BackendResponse, ChunkResult, QueryResult};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct KairosConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub per_chunk_timeout: Duration,
}

impl KairosConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            request_timeout: Duration::from_secs(30),
            per_chunk_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_per_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.per_chunk_timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ProxyRequest<'a> {
    metrics: [&'a MetricQuery; 1],
    cache_time: i64,
    start_absolute: i64,
    end_absolute: i64,
}

/// Wraps a single `reqwest::Client` shared across every call; cheap to
/// clone (internally `Arc`-backed) so it can be handed to spawned chunk
/// tasks without a connection-pool per task.
#[derive(Debug, Clone)]
pub struct KairosClient {
    client: reqwest::Client,
    config: KairosConfig,
}

impl KairosClient {
    pub fn new(config: KairosConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    /// Single-shot proxy call over an absolute millisecond window.
    pub async fn proxy(&self, metric: &MetricQuery, start_ms: i64, end_ms: i64) -> Result<QueryResult> {
        let body = ProxyRequest {
            metrics: [metric],
            cache_time: 0,
            start_absolute: start_ms,
            end_absolute: end_ms,
        };
        fetch_one(&self.client, &self.config, &body).await
    }

    /// Fan out one backend call per chunk (chunks given newest-first, in
    /// Unix seconds). Waits for every chunk, each under its own timeout,
    /// before inspecting results: if any chunk failed, returns the
    /// lowest-index failure, not whichever happened to finish first.
    pub async fn proxy_chunked(&self, metric: &MetricQuery, chunks: &[(i64, i64)]) -> Result<Vec<ChunkResult>> {
        let mut handles = FuturesUnordered::new();

        for (index, &(start, end)) in chunks.iter().enumerate() {
            let client = self.client.clone();
            let config = self.config.clone();
            let metric = metric.clone();
            handles.push(tokio::spawn(async move {
                let body = ProxyRequest {
                    metrics: [&metric],
                    cache_time: 0,
                    start_absolute: start * 1000,
                    end_absolute: end * 1000,
                };
                let outcome = match tokio::time::timeout(config.per_chunk_timeout, fetch_one(&client, &config, &body)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(BackendError::Timeout),
                };
                (index, (start, end), outcome)
            }));
        }

        let mut outcomes = Vec::with_capacity(chunks.len());
        while let Some(joined) = handles.next().await {
            let (index, range, outcome) = joined.map_err(|e| BackendError::Join(e.to_string()))?;
            outcomes.push((index, range, outcome));
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        if let Some(pos) = outcomes.iter().position(|(_, _, outcome)| outcome.is_err()) {
            return Err(outcomes.into_iter().nth(pos).unwrap().2.unwrap_err());
        }

        let collected = outcomes
            .into_iter()
            .map(|(index, range, outcome)| ChunkResult { index, range, result: outcome.unwrap() })
            .collect();
        Ok(collected)
    }

    /// Passthrough GET to the backend's own metric-name listing endpoint.
    /// Returned verbatim, uninterpreted.
    pub async fn get_metric_names(&self) -> Result<serde_json::Value> {
        self.get_passthrough("/api/v1/metricnames").await
    }

    pub async fn get_tag_names(&self) -> Result<serde_json::Value> {
        self.get_passthrough("/api/v1/tagnames").await
    }

    pub async fn get_tag_values(&self) -> Result<serde_json::Value> {
        self.get_passthrough("/api/v1/tagvalues").await
    }

    pub async fn query_tags(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/api/v1/datapoints/query/tags", self.config.base_url());
        let response = self.client.post(url).json(body).send().await?;
        parse_passthrough(response).await
    }

    async fn get_passthrough(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url(), path);
        let response = self.client.get(url).send().await?;
        parse_passthrough(response).await
    }
}

async fn parse_passthrough(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<BackendErrorBody>().await {
            Ok(body) if !body.errors.is_empty() => body.errors.join("; "),
            _ => status.to_string(),
        };
        return Err(BackendError::Status { status: status.as_u16(), message });
    }
    Ok(response.json().await?)
}

async fn fetch_one(client: &reqwest::Client, config: &KairosConfig, body: &ProxyRequest<'_>) -> Result<QueryResult> {
    let url = format!("{}/api/v1/datapoints/query", config.base_url());
    let response = client.post(url).json(body).send().await?;
    let status = response.status();

    if !status.is_success() {
        let message = match response.json::<BackendErrorBody>().await {
            Ok(body) if !body.errors.is_empty() => body.errors.join("; "),
            _ => status.to_string(),
        };
        return Err(BackendError::Status { status: status.as_u16(), message });
    }

    let parsed: BackendResponse = response.json().await?;
    if parsed.queries.len() > 1 {
        tracing::warn!(count = parsed.queries.len(), "backend returned more than one query result block");
    }
    parsed.queries.into_iter().next().ok_or(BackendError::EmptyResponse)
}

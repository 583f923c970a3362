//! Wire types exchanged with the backend TSDB.

use crate::keys::Aggregator;
use serde::{Deserialize, Serialize};

/// One series in a backend response: the metric identity plus its
/// `[timestamp_ms, value]` datapoints.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct SeriesResult {
    pub name: String,
    #[serde(default)]
    pub tags: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregators: Vec<Aggregator>,
    pub values: Vec<(i64, f64)>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct QueryResult {
    pub results: Vec<SeriesResult>,
    #[serde(default)]
    pub sample_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackendResponse {
    #[serde(default)]
    pub queries: Vec<QueryResult>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One chunk's result from a chunked-parallel fetch, tagged with its
/// position in the original (newest-first) chunk list so callers can
/// restore ordering after out-of-order completion.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub index: usize,
    pub range: (i64, i64),
    pub result: QueryResult,
}

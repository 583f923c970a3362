//! Query (KQuery) (C5): the cached record for one user metric query, plus
//! the request payload it's derived from.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tscached_backend::{cache_key, fingerprint, normalize_aggregators, CacheKind, MetricQuery, RequestWindow};

pub const DEFAULT_TTL: Duration = Duration::from_secs(10_800);

/// The `POST /api/v1/datapoints/query` request body: one or more metric
/// queries sharing a single time window.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatapointsQueryRequest {
    pub metrics: Vec<MetricQuery>,
    #[serde(flatten)]
    pub window: RequestWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_time: Option<i64>,
}

/// The cached record for one metric query: its fingerprint, the
/// (normalized) query body, the series it last produced, and the temporal
/// bounds those series are known to cover.
///
/// `mts_keys` holds fingerprint strings, not live references to MTS
/// records — the association is reconstructed on every request rather than
/// held as a back-reference, since MTS records carry nothing pointing back
/// to the KQueries that reference them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KQuery {
    pub fingerprint: String,
    pub query: MetricQuery,
    #[serde(default)]
    pub mts_keys: Vec<String>,
    pub earliest_data: i64,
    pub last_add_data: i64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

impl KQuery {
    /// Build a fresh, not-yet-populated KQuery for a normalized query.
    /// `earliest_data`/`last_add_data` are left at `now` until the first
    /// `upsert`.
    fn new(query: MetricQuery, now: i64) -> Result<Self, serde_json::Error> {
        let fingerprint = fingerprint(&query)?;
        Ok(Self { fingerprint, query, mts_keys: Vec::new(), earliest_data: now, last_add_data: now, ttl_secs: DEFAULT_TTL.as_secs() })
    }

    pub fn cache_key(&self) -> String {
        cache_key(CacheKind::Kquery, &self.fingerprint)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Overwrite the cached bounds and series set. `end_time` defaults to
    /// `now` when absent (a caller that only knows a lower bound, e.g. a
    /// still-in-flight cold fetch, can omit it).
    pub fn upsert(&mut self, mts_keys: Vec<String>, start_time: i64, end_time: Option<i64>, now: i64) {
        self.mts_keys = mts_keys;
        self.earliest_data = start_time;
        self.last_add_data = end_time.unwrap_or(now);
    }
}

/// Lazy sequence: one KQuery per metric in `payload.metrics`, each with
/// aggregator alignment already normalized. Non-restartable by nature of
/// `Iterator`, finite (bounded by `payload.metrics.len()`).
pub fn from_request(payload: &DatapointsQueryRequest, now: i64) -> impl Iterator<Item = Result<KQuery, serde_json::Error>> + '_ {
    payload.metrics.iter().map(move |metric| {
        let mut query = metric.clone();
        normalize_aggregators(&mut query);
        KQuery::new(query, now)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> DatapointsQueryRequest {
        DatapointsQueryRequest {
            metrics: vec![MetricQuery {
                name: "cpu.usage".into(),
                tags: serde_json::Map::new(),
                group_by: None,
                aggregators: vec![],
                extra: serde_json::Map::new(),
            }],
            window: RequestWindow::default(),
            cache_time: None,
        }
    }

    #[test]
    fn from_request_yields_one_kquery_per_metric() {
        let request = sample_request();
        let kqueries: Vec<_> = from_request(&request, 1_000).map(Result::unwrap).collect();
        assert_eq!(kqueries.len(), 1);
        assert_eq!(kqueries[0].query.name, "cpu.usage");
        assert_eq!(kqueries[0].fingerprint.len(), 32);
    }

    #[test]
    fn from_request_normalizes_aggregators() {
        let mut request = sample_request();
        request.metrics[0].aggregators.push(tscached_backend::Aggregator {
            name: "avg".into(),
            align_sampling: Some(true),
            align_start_time: None,
            extra: serde_json::Map::new(),
        });
        let kqueries: Vec<_> = from_request(&request, 1_000).map(Result::unwrap).collect();
        assert_eq!(kqueries[0].query.aggregators[0].align_start_time, Some(true));
        assert_eq!(kqueries[0].query.aggregators[0].align_sampling, None);
    }

    #[test]
    fn fingerprint_is_stable_for_identical_queries() {
        let request = sample_request();
        let a: Vec<_> = from_request(&request, 1_000).map(Result::unwrap).collect();
        let b: Vec<_> = from_request(&request, 2_000).map(Result::unwrap).collect();
        assert_eq!(a[0].fingerprint, b[0].fingerprint, "fingerprint must not depend on `now`");
    }

    #[test]
    fn upsert_overwrites_bounds_and_keys() {
        let request = sample_request();
        let mut kquery = from_request(&request, 1_000).map(Result::unwrap).next().unwrap();
        kquery.upsert(vec!["tscached:mts:abc".into()], 500, Some(1_500), 2_000);
        assert_eq!(kquery.earliest_data, 500);
        assert_eq!(kquery.last_add_data, 1_500);
        assert_eq!(kquery.mts_keys, vec!["tscached:mts:abc".to_string()]);
    }

    #[test]
    fn upsert_defaults_missing_end_to_now() {
        let request = sample_request();
        let mut kquery = from_request(&request, 1_000).map(Result::unwrap).next().unwrap();
        kquery.upsert(vec![], 500, None, 2_000);
        assert_eq!(kquery.last_add_data, 2_000);
    }
}

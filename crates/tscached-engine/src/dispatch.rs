//! Request dispatch (C8): turn a parsed query request into one coherence
//! pass per metric and aggregate the results.

use crate::coherence::{self, CacheMode, EngineConfig};
use crate::error::{EngineError, Result};
use crate::kquery::{self, DatapointsQueryRequest, KQuery};
use tscached_backend::{get_chunked_time_ranges, resolve_window, BackendError, BackendResponse, KairosClient, QueryResult, ResolvedWindow};
use tscached_cache::{CacheBackend, CacheBackendExt};

/// The overall cache-mode reported on `X-tscached-mode`, aggregated across
/// every KQuery in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Hot,
    WarmAppend,
    WarmPrepend,
    ColdMiss,
    /// A KQuery degraded to a direct backend proxy because the cache
    /// itself failed; behaves as though the cache were empty.
    ColdProxy,
    /// More than one distinct mode among this request's KQueries.
    Mixed,
}

impl From<CacheMode> for ResponseMode {
    fn from(mode: CacheMode) -> Self {
        match mode {
            CacheMode::Hot => ResponseMode::Hot,
            CacheMode::WarmAppend => ResponseMode::WarmAppend,
            CacheMode::WarmPrepend => ResponseMode::WarmPrepend,
            CacheMode::ColdMiss => ResponseMode::ColdMiss,
        }
    }
}

impl ResponseMode {
    pub fn as_header_value(self) -> &'static str {
        match self {
            ResponseMode::Hot => "hot",
            ResponseMode::WarmAppend => "warm_append",
            ResponseMode::WarmPrepend => "warm_prepend",
            ResponseMode::ColdMiss => "cold_miss",
            ResponseMode::ColdProxy => "cold_proxy",
            ResponseMode::Mixed => "mixed",
        }
    }
}

fn aggregate_mode(modes: &[ResponseMode]) -> ResponseMode {
    match modes.split_first() {
        None => ResponseMode::ColdMiss,
        Some((first, rest)) => {
            if rest.iter().all(|m| m == first) {
                *first
            } else {
                ResponseMode::Mixed
            }
        }
    }
}

/// Run every KQuery derived from `request` through the coherence engine.
///
/// A `BackendFailure` anywhere aborts the whole request (propagated to the
/// caller, who maps it to HTTP 500). A `CacheFailure` on a single KQuery's
/// lookup or coherence pass degrades just that KQuery to a direct backend
/// proxy; the rest of the request proceeds normally.
#[tracing::instrument(name = "handle_request", skip_all, fields(metrics = request.metrics.len()))]
pub async fn handle_request<C: CacheBackend + ?Sized>(
    cache: &C,
    backend: &KairosClient,
    config: &EngineConfig,
    request: &DatapointsQueryRequest,
    now: i64,
) -> Result<(BackendResponse, ResponseMode)> {
    let window = resolve_window(&request.window, now);

    let mut queries = Vec::with_capacity(request.metrics.len());
    let mut modes = Vec::with_capacity(request.metrics.len());

    for built in kquery::from_request(request, now) {
        let fresh = built.map_err(|e| EngineError::BackendFailure(BackendError::Serialization(e)))?;

        let (mut kquery, loaded_ok) = match cache.get_json::<KQuery>(&fresh.cache_key()).await {
            Ok(Some(existing)) => (existing, true),
            Ok(None) => (fresh, true),
            Err(_) => (fresh, false),
        };

        if !loaded_ok {
            let result = direct_cold_proxy(backend, config, &kquery, window).await?;
            queries.push(result);
            modes.push(ResponseMode::ColdProxy);
            continue;
        }

        match coherence::process_cache_hit(cache, backend, config, &mut kquery, window, now).await {
            Ok((result, mode)) => {
                queries.push(result);
                modes.push(mode.into());
            }
            Err(EngineError::BackendFailure(e)) => return Err(EngineError::BackendFailure(e)),
            Err(EngineError::CacheFailure(_)) => {
                let result = direct_cold_proxy(backend, config, &kquery, window).await?;
                queries.push(result);
                modes.push(ResponseMode::ColdProxy);
            }
        }
    }

    let mode = aggregate_mode(&modes);
    Ok((BackendResponse { queries }, mode))
}

/// Serve straight from the backend, bypassing the cache entirely. Used
/// when the cache has already failed for this KQuery, so behaving as if
/// the cache were empty is the only option left.
async fn direct_cold_proxy(backend: &KairosClient, config: &EngineConfig, kquery: &KQuery, window: ResolvedWindow) -> Result<QueryResult> {
    let chunks = get_chunked_time_ranges(config.chunk_length, window.start, window.end);
    let chunk_results = backend.proxy_chunked(&kquery.query, &chunks).await?;

    let mut acc = QueryResult::default();
    for chunk in chunk_results.iter().rev() {
        for series in &chunk.result.results {
            acc.sample_size += series.values.len();
            acc.results.push(series.clone());
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_mode_is_uniform_when_all_equal() {
        let modes = vec![ResponseMode::Hot, ResponseMode::Hot];
        assert_eq!(aggregate_mode(&modes), ResponseMode::Hot);
    }

    #[test]
    fn aggregate_mode_is_mixed_when_modes_differ() {
        let modes = vec![ResponseMode::Hot, ResponseMode::ColdMiss];
        assert_eq!(aggregate_mode(&modes), ResponseMode::Mixed);
    }

    #[test]
    fn aggregate_mode_defaults_to_cold_miss_when_empty() {
        assert_eq!(aggregate_mode(&[]), ResponseMode::ColdMiss);
    }

    #[test]
    fn header_values_match_the_external_contract() {
        assert_eq!(ResponseMode::Hot.as_header_value(), "hot");
        assert_eq!(ResponseMode::WarmAppend.as_header_value(), "warm_append");
        assert_eq!(ResponseMode::WarmPrepend.as_header_value(), "warm_prepend");
        assert_eq!(ResponseMode::ColdMiss.as_header_value(), "cold_miss");
        assert_eq!(ResponseMode::ColdProxy.as_header_value(), "cold_proxy");
        assert_eq!(ResponseMode::Mixed.as_header_value(), "mixed");
    }
}

//! Coherence engine (C6): decides whether a query is HOT, WARM, or COLD
//! against the cache, and runs the matching fetch/merge path.

use crate::error::Result;
use crate::kquery::KQuery;
use crate::mts::{self, Mts};
use std::collections::HashMap;
use tscached_backend::{
    cache_key, fingerprint, get_chunked_time_ranges, get_range_needed, mts_key_basis, CacheKind, KairosClient, QueryResult,
    RangeNeeded, ResolvedWindow, SeriesResult,
};
use tscached_cache::{CacheBackend, CacheBackendExt};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub staleness_threshold: i64,
    pub expected_resolution_ms: i64,
    pub chunk_length: i64,
}

/// The cache-mode an individual KQuery resolved to; aggregated into the
/// response's `X-tscached-mode` header by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Hot,
    WarmAppend,
    WarmPrepend,
    ColdMiss,
}

fn mts_key_for(kquery: &KQuery) -> Result<String> {
    let basis = mts_key_basis(&kquery.query)?;
    let digest = fingerprint(&basis)?;
    Ok(cache_key(CacheKind::Mts, &digest))
}

/// Entry point: classify the request against what `kquery` already has
/// cached and dispatch to the matching path.
#[tracing::instrument(skip(cache, backend, config, kquery, window), fields(fingerprint = %kquery.fingerprint))]
pub async fn process_cache_hit<C: CacheBackend + ?Sized>(
    cache: &C,
    backend: &KairosClient,
    config: &EngineConfig,
    kquery: &mut KQuery,
    window: ResolvedWindow,
    now: i64,
) -> Result<(QueryResult, CacheMode)> {
    let cached_bounds = if kquery.mts_keys.is_empty() { None } else { Some((kquery.earliest_data, kquery.last_add_data)) };

    let range_needed = get_range_needed(window.start, window.end, cached_bounds, config.staleness_threshold, None);

    match range_needed {
        RangeNeeded::NoneNeeded => hot(cache, kquery, window, config).await,
        RangeNeeded::FetchAll { .. } if cached_bounds.is_some() => {
            tracing::warn!(fingerprint = %kquery.fingerprint, "odd cold: FETCH_ALL with non-empty cache");
            cold(cache, backend, config, kquery, window, now).await
        }
        RangeNeeded::FetchAll { .. } => cold(cache, backend, config, kquery, window, now).await,
        RangeNeeded::FetchAfter { start, end } => {
            warm(cache, backend, config, kquery, window, start, end, now, CacheMode::WarmAppend).await
        }
        RangeNeeded::FetchBefore { start, end } => {
            warm(cache, backend, config, kquery, window, start, end, now, CacheMode::WarmPrepend).await
        }
    }
}

/// Pipelined multi-get of every cached series; each surviving one is
/// trimmed into the response. All-evicted degrades to an empty-values
/// echo of the original query, TSDB-compatible shape.
#[tracing::instrument(skip(cache, kquery, window, config), fields(fingerprint = %kquery.fingerprint))]
async fn hot<C: CacheBackend + ?Sized>(
    cache: &C,
    kquery: &KQuery,
    window: ResolvedWindow,
    config: &EngineConfig,
) -> Result<(QueryResult, CacheMode)> {
    let mut acc = QueryResult::default();
    let series: Vec<Option<Mts>> = cache.get_many_json(&kquery.mts_keys).await?;

    for entry in series.into_iter().flatten() {
        mts::build_response(&entry, window.start, Some(window.end), config.expected_resolution_ms, true, &mut acc);
    }

    if acc.results.is_empty() {
        acc.results.push(SeriesResult {
            name: kquery.query.name.clone(),
            tags: kquery.query.tags.clone(),
            group_by: kquery.query.group_by.clone(),
            aggregators: kquery.query.aggregators.clone(),
            values: Vec::new(),
        });
    }

    Ok((acc, CacheMode::Hot))
}

/// Chunk the window, fetch every chunk in parallel, then merge oldest-first
/// into a fresh series set.
///
/// Series identity under one KQuery is constant (name/tags/group_by/
/// aggregators are all taken from the query, not the response) so a
/// `group_by` query that fans out into multiple response series will
/// collapse onto a single cache entry here; this follows directly from the
/// tags-from-query keying rule and is accepted as a known corner case
/// rather than invented disambiguation.
#[tracing::instrument(skip(cache, backend, config, kquery, window), fields(fingerprint = %kquery.fingerprint))]
async fn cold<C: CacheBackend + ?Sized>(
    cache: &C,
    backend: &KairosClient,
    config: &EngineConfig,
    kquery: &mut KQuery,
    window: ResolvedWindow,
    now: i64,
) -> Result<(QueryResult, CacheMode)> {
    let chunks = get_chunked_time_ranges(config.chunk_length, window.start, window.end);
    let chunk_results = backend.proxy_chunked(&kquery.query, &chunks).await?;

    let mts_key = mts_key_for(kquery)?;
    let mut merged: Option<Mts> = None;

    // Walk oldest-first: proxy_chunked returns results indexed the way the
    // chunks were given (newest first), so the last index is the oldest.
    for chunk in chunk_results.iter().rev() {
        for series in &chunk.result.results {
            match &mut merged {
                None => {
                    merged = Some(Mts {
                        name: kquery.query.name.clone(),
                        tags: kquery.query.tags.clone(),
                        group_by: kquery.query.group_by.clone(),
                        aggregators: kquery.query.aggregators.clone(),
                        values: series.values.clone(),
                    });
                }
                Some(existing) => existing.values.extend_from_slice(&series.values),
            }
        }
    }

    let mut acc = QueryResult::default();

    let Some(entry) = merged else {
        acc.results.push(SeriesResult {
            name: kquery.query.name.clone(),
            tags: kquery.query.tags.clone(),
            group_by: kquery.query.group_by.clone(),
            aggregators: kquery.query.aggregators.clone(),
            values: Vec::new(),
        });
        return Ok((acc, CacheMode::ColdMiss));
    };

    mts::build_response(&entry, window.start, Some(window.end), config.expected_resolution_ms, false, &mut acc);

    if let Err(e) = cache.set_json(&mts_key, &entry, kquery.ttl()).await {
        tracing::warn!(error = %e, key = %mts_key, "cold: MTS write failed, degrading to pass-through");
    }

    let oldest_start = chunks.last().map(|(s, _)| *s).unwrap_or(window.start);
    let newest_end = chunks.first().map(|(_, e)| *e).unwrap_or(window.end);
    kquery.upsert(vec![mts_key], oldest_start, Some(newest_end), now);
    if let Err(e) = cache.set_json(&kquery.cache_key(), &*kquery, kquery.ttl()).await {
        tracing::warn!(error = %e, fingerprint = %kquery.fingerprint, "cold: KQuery write failed, degrading to pass-through");
    }

    Ok((acc, CacheMode::ColdMiss))
}

/// Fetch only the missing slice (nudged by one resolution step so the new
/// data overlaps the cached data by at least one sample), then merge it
/// into every affected cached series.
#[allow(clippy::too_many_arguments)]
#[tracing::instrument(skip(cache, backend, config, kquery, window), fields(fingerprint = %kquery.fingerprint, mode = ?mode))]
async fn warm<C: CacheBackend + ?Sized>(
    cache: &C,
    backend: &KairosClient,
    config: &EngineConfig,
    kquery: &mut KQuery,
    window: ResolvedWindow,
    fetch_start: i64,
    fetch_end: i64,
    now: i64,
    mode: CacheMode,
) -> Result<(QueryResult, CacheMode)> {
    let (start_ms, end_ms) = match mode {
        CacheMode::WarmAppend => (fetch_start * 1000 - config.expected_resolution_ms, fetch_end * 1000),
        _ => (fetch_start * 1000, fetch_end * 1000 + config.expected_resolution_ms),
    };

    let fetched = backend.proxy(&kquery.query, start_ms, end_ms).await?;

    let mut cached_by_key: HashMap<String, Mts> = HashMap::new();
    let cached: Vec<Option<Mts>> = cache.get_many_json(&kquery.mts_keys).await?;
    for (key, entry) in kquery.mts_keys.iter().zip(cached.into_iter()) {
        if let Some(entry) = entry {
            cached_by_key.insert(key.clone(), entry);
        }
    }

    let mut acc = QueryResult::default();
    let mut start_times = Vec::new();
    let mut end_times = Vec::new();
    let mut live_keys = Vec::new();
    let key = mts_key_for(kquery)?;

    // A `group_by` response can fan out into several series under this one
    // key; accumulate all of them before a single read-modify-write, the
    // same discipline `cold()` uses, rather than draining `cached_by_key`
    // on the first series and clobbering it on the next.
    if !fetched.results.is_empty() {
        let mut new_values: Vec<(i64, f64)> = Vec::new();
        for series in &fetched.results {
            new_values.extend_from_slice(&series.values);
        }

        let (mut entry, trim) = match cached_by_key.remove(&key) {
            None => (
                Mts {
                    name: kquery.query.name.clone(),
                    tags: kquery.query.tags.clone(),
                    group_by: kquery.query.group_by.clone(),
                    aggregators: kquery.query.aggregators.clone(),
                    values: new_values,
                },
                false,
            ),
            Some(mut entry) => {
                match mode {
                    CacheMode::WarmAppend => mts::merge_at_end(&mut entry.values, &new_values),
                    _ => mts::merge_at_beginning(&mut entry.values, &new_values),
                }
                (entry, true)
            }
        };

        if matches!(mode, CacheMode::WarmAppend) {
            if let Some(new_earliest) = mts::ttl_expire(&mut entry.values, now, mts::DEFAULT_GC_EXPIRY_SECONDS, mts::DEFAULT_TTL_SECONDS) {
                start_times.push(new_earliest);
            }
        }
        if let Some(first) = entry.values.first() {
            start_times.push(first.0 / 1000);
        }
        if let Some(last) = entry.values.last() {
            end_times.push(last.0 / 1000);
        }

        mts::build_response(&entry, window.start, Some(window.end), config.expected_resolution_ms, trim, &mut acc);
        if let Err(e) = cache.set_json(&key, &entry, kquery.ttl()).await {
            tracing::warn!(error = %e, key = %key, "warm: series write failed");
        }
        live_keys.push(key.clone());
    }

    // Any cached series the fetch didn't touch are still live and must be
    // carried forward in mts_keys.
    live_keys.extend(cached_by_key.into_keys());

    if let (Some(start), Some(end)) = (start_times.iter().min(), end_times.iter().max()) {
        kquery.upsert(live_keys, *start, Some(*end), now);
    } else {
        kquery.upsert(live_keys, kquery.earliest_data, Some(kquery.last_add_data), now);
    }

    if let Err(e) = cache.set_json(&kquery.cache_key(), &*kquery, kquery.ttl()).await {
        tracing::warn!(error = %e, fingerprint = %kquery.fingerprint, "warm: KQuery write failed, degrading to pass-through");
    }

    Ok((acc, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tscached_backend::MetricQuery;
    use tscached_cache::InMemoryBackend;

    fn sample_query() -> MetricQuery {
        MetricQuery {
            name: "cpu.usage".into(),
            tags: serde_json::Map::new(),
            group_by: None,
            aggregators: vec![],
            extra: serde_json::Map::new(),
        }
    }

    fn config() -> EngineConfig {
        EngineConfig { staleness_threshold: 30, expected_resolution_ms: 10_000, chunk_length: 1_800 }
    }

    #[tokio::test]
    async fn hot_with_no_cached_keys_returns_empty_echo() {
        let cache = InMemoryBackend::new();
        let kquery = crate::kquery::from_request(
            &crate::kquery::DatapointsQueryRequest {
                metrics: vec![sample_query()],
                window: tscached_backend::RequestWindow::default(),
                cache_time: None,
            },
            1_000,
        )
        .next()
        .unwrap()
        .unwrap();

        let window = ResolvedWindow { start: 0, end: 1_000 };
        let (result, mode) = hot(&cache, &kquery, window, &config()).await.unwrap();
        assert_eq!(mode, CacheMode::Hot);
        assert_eq!(result.results.len(), 1);
        assert!(result.results[0].values.is_empty());
    }
}

//! The read-ahead work loop (C7): re-warm every tracked query's cache
//! entry with "everything we know about" it, so the next live request for
//! that query lands HOT instead of WARM or COLD.

use crate::config::ReadaheadConfig;
use crate::error::{ReadaheadError, Result};
use crate::leader::{self, Lease};
use tscached_backend::{cache_key, resolve_window, CacheKind, FlexInt, KairosClient, RelativeTime, RequestWindow, TimeUnit};
use tscached_cache::{CacheBackend, CacheBackendExt};
use tscached_engine::{EngineConfig, KQuery};

/// Tally of one pass over the shadow list, for logging/metrics at the
/// call site.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub refreshed: usize,
    pub skipped_missing: usize,
    pub backend_failures: usize,
}

/// Synthetic "everything we know about this series" window: relative span
/// equal to the number of minutes since the Unix epoch, which for any
/// sane wall-clock value vastly exceeds a single series' retention and so
/// forces a full-history re-fetch of whatever the cache is missing.
fn everything_window(now: i64) -> tscached_backend::ResolvedWindow {
    let minutes_since_epoch = now / 60;
    let req = RequestWindow {
        start_relative: Some(RelativeTime { value: FlexInt::Num(minutes_since_epoch), unit: TimeUnit::Minutes }),
        ..Default::default()
    };
    resolve_window(&req, now)
}

/// Run one pass over `shadow_list`, re-warming each tracked KQuery.
///
/// A `BackendFailure` on one entry is logged and the pass moves on to the
/// next fingerprint (the original data may simply be unreachable for one
/// series). A `CacheFailure` aborts the whole pass — the cache itself is
/// unusable at that point, so continuing would just fail again and again.
#[tracing::instrument(skip_all, fields(shadow_list_key))]
pub async fn run_pass<C: CacheBackend + ?Sized>(
    cache: &C,
    backend: &KairosClient,
    engine_config: &EngineConfig,
    shadow_list_key: &str,
    now: i64,
) -> Result<PassSummary> {
    let fingerprints = cache.smembers(shadow_list_key).await?;
    let window = everything_window(now);
    let mut summary = PassSummary::default();

    for fingerprint in fingerprints {
        let key = cache_key(CacheKind::Kquery, &fingerprint);
        let mut kquery: KQuery = match cache.get_json(&key).await? {
            Some(kquery) => kquery,
            None => {
                summary.skipped_missing += 1;
                continue;
            }
        };

        match tscached_engine::process_cache_hit(cache, backend, engine_config, &mut kquery, window, now).await {
            Ok((_, mode)) => {
                tracing::debug!(fingerprint = %fingerprint, mode = ?mode, "shadow: refreshed");
                summary.refreshed += 1;
            }
            Err(tscached_engine::EngineError::BackendFailure(e)) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "shadow: backend failure, skipping entry");
                summary.backend_failures += 1;
            }
            Err(tscached_engine::EngineError::CacheFailure(e)) => {
                return Err(ReadaheadError::Cache(e));
            }
        }
    }

    Ok(summary)
}

/// Full orchestration: try to lead, and if successful run one pass before
/// releasing the lock. Returns `None` if another worker already holds
/// leadership this cycle.
#[tracing::instrument(skip_all)]
pub async fn perform_readahead<C: CacheBackend + ?Sized>(
    cache: &C,
    backend: &KairosClient,
    engine_config: &EngineConfig,
    config: &ReadaheadConfig,
    shadow_list_key: &str,
    now: i64,
) -> Result<Option<PassSummary>> {
    let owner = leader::local_owner();
    let Some(lease) = leader::become_leader(cache, config, &owner).await? else {
        tracing::info!("shadow: another worker holds the lock, skipping this cycle");
        return Ok(None);
    };

    let result = run_pass(cache, backend, engine_config, shadow_list_key, now).await;

    release_best_effort(cache, &lease).await;

    result.map(Some)
}

async fn release_best_effort<C: CacheBackend + ?Sized>(cache: &C, lease: &Lease) {
    if let Err(e) = leader::release_leader(cache, lease).await {
        tracing::warn!(owner = lease.owner(), error = %e, "shadow: failed to release lock, relying on TTL expiry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tscached_backend::{KairosConfig, MetricQuery, SHADOW_LIST_KEY};
    use tscached_cache::InMemoryBackend;

    fn sample_kquery(now: i64) -> KQuery {
        let request = tscached_engine::DatapointsQueryRequest {
            metrics: vec![MetricQuery {
                name: "cpu.usage".into(),
                tags: serde_json::Map::new(),
                group_by: None,
                aggregators: vec![],
                extra: serde_json::Map::new(),
            }],
            window: RequestWindow::default(),
            cache_time: None,
        };
        tscached_engine::kquery::from_request(&request, now).next().unwrap().unwrap()
    }

    fn engine_config() -> EngineConfig {
        EngineConfig { staleness_threshold: 30, expected_resolution_ms: 10_000, chunk_length: 1_800 }
    }

    fn backend() -> KairosClient {
        KairosClient::new(KairosConfig::new("localhost", 8080)).unwrap()
    }

    #[tokio::test]
    async fn pass_skips_fingerprints_with_no_stored_kquery() {
        let cache = InMemoryBackend::new();
        cache.sadd(SHADOW_LIST_KEY, "dangling-fingerprint").await.unwrap();

        let summary = run_pass(&cache, &backend(), &engine_config(), SHADOW_LIST_KEY, 10_000).await.unwrap();
        assert_eq!(summary.skipped_missing, 1);
        assert_eq!(summary.refreshed, 0);
    }

    #[tokio::test]
    async fn pass_refreshes_a_fully_covered_tracked_kquery_as_hot() {
        // Bounds cover the synthetic "everything" window entirely, so this
        // takes the HOT path and never touches the backend.
        let cache = InMemoryBackend::new();
        let now = 10_000;
        let mut kquery = sample_kquery(now);
        kquery.upsert(vec!["tscached:mts:dummy".into()], 0, Some(now), now);
        cache.set_json(&kquery.cache_key(), &kquery, kquery.ttl()).await.unwrap();
        cache.sadd(SHADOW_LIST_KEY, &kquery.fingerprint).await.unwrap();

        let summary = run_pass(&cache, &backend(), &engine_config(), SHADOW_LIST_KEY, now).await.unwrap();
        assert_eq!(summary.skipped_missing, 0);
        assert_eq!(summary.refreshed, 1);
    }

    #[tokio::test]
    async fn empty_shadow_list_is_a_no_op_pass() {
        let cache = InMemoryBackend::new();
        let summary = run_pass(&cache, &backend(), &engine_config(), SHADOW_LIST_KEY, 10_000).await.unwrap();
        assert_eq!(summary, PassSummary::default());
    }
}

//! Series (MTS) (C4): seam merges, trimming, TTL expiry, response building.

use serde::{Deserialize, Serialize};
use tscached_backend::{Aggregator, QueryResult, SeriesResult};

pub const DEFAULT_TTL_SECONDS: i64 = 10_800;
pub const DEFAULT_GC_EXPIRY_SECONDS: i64 = 12_600;
pub const DEFAULT_ACCEPTABLE_SKEW: i64 = 6;

const MERGE_CUTOFF: usize = 10;

/// One metric-time-series as held in the cache: identity fields plus its
/// chronologically-ordered `(timestamp_ms, value)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mts {
    pub name: String,
    #[serde(default)]
    pub tags: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregators: Vec<Aggregator>,
    pub values: Vec<(i64, f64)>,
}

impl From<SeriesResult> for Mts {
    fn from(series: SeriesResult) -> Self {
        Self {
            name: series.name,
            tags: series.tags,
            group_by: series.group_by,
            aggregators: series.aggregators,
            values: series.values,
        }
    }
}

impl From<Mts> for SeriesResult {
    fn from(mts: Mts) -> Self {
        Self { name: mts.name, tags: mts.tags, group_by: mts.group_by, aggregators: mts.aggregators, values: mts.values }
    }
}

/// Outcome of a seam merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge succeeded; `dropped` cached points at the seam were replaced
    /// by the overlapping prefix/suffix of the new data.
    Merged { dropped: usize },
    /// The cached series was too short to find a valid seam; it was
    /// replaced wholesale by `new`.
    Replaced,
    /// No convergence within `cutoff` points; the series is pathologically
    /// stale or clock-skewed. `cached` is left untouched.
    Aborted,
}

/// Append `new` after `cached`, resolving overlap at the seam.
///
/// Walks `cached` backward to find the smallest offset `k` (1-indexed from
/// the end) such that `cached[len-k].ts < new[0].ts`. `k = 1` means no
/// overlap — pure concatenation. A strict `<` (rather than the cached
/// record's own duplicate-tolerant `<=`) is used deliberately: it's what
/// makes an exact-timestamp collision at the seam resolve to `new`'s value
/// (new wins), per the series' stated duplicate-resolution behavior.
pub fn merge_at_end(cached: &mut Vec<(i64, f64)>, new: &[(i64, f64)]) -> MergeOutcome {
    if new.is_empty() {
        return MergeOutcome::Merged { dropped: 0 };
    }
    if cached.is_empty() {
        *cached = new.to_vec();
        return MergeOutcome::Replaced;
    }

    let len = cached.len();
    let new_start_ts = new[0].0;

    for k in 1..=MERGE_CUTOFF {
        if k > len {
            *cached = new.to_vec();
            return MergeOutcome::Replaced;
        }
        if cached[len - k].0 < new_start_ts {
            cached.truncate(len - k + 1);
            cached.extend_from_slice(new);
            return MergeOutcome::Merged { dropped: k - 1 };
        }
    }

    MergeOutcome::Aborted
}

/// Symmetric to `merge_at_end`: prepend `new` before `cached`, resolving
/// overlap at the seam. Finds the smallest forward offset `f` (0-indexed)
/// such that `cached[f].ts > new.last.ts`.
pub fn merge_at_beginning(cached: &mut Vec<(i64, f64)>, new: &[(i64, f64)]) -> MergeOutcome {
    if new.is_empty() {
        return MergeOutcome::Merged { dropped: 0 };
    }
    if cached.is_empty() {
        *cached = new.to_vec();
        return MergeOutcome::Replaced;
    }

    let len = cached.len();
    let new_end_ts = new[new.len() - 1].0;

    for f in 0..MERGE_CUTOFF {
        if f >= len {
            *cached = new.to_vec();
            return MergeOutcome::Replaced;
        }
        if cached[f].0 > new_end_ts {
            let mut merged = new.to_vec();
            merged.extend_from_slice(&cached[f..]);
            *cached = merged;
            return MergeOutcome::Merged { dropped: f };
        }
    }

    MergeOutcome::Aborted
}

/// O(n) linear filter: every point whose `ts_ms / 1000` falls in
/// `[start, end]` (end open-ended when `None`).
pub fn robust_trim(values: &[(i64, f64)], start: i64, end: Option<i64>) -> Vec<(i64, f64)> {
    values
        .iter()
        .copied()
        .filter(|(ts_ms, _)| {
            let ts = ts_ms / 1000;
            ts >= start && end.map(|e| ts <= e).unwrap_or(true)
        })
        .collect()
}

/// O(1) offset arithmetic assuming uniform sampling at
/// `expected_resolution_ms`. Only valid when
/// `conforms_to_efficient_constraints` holds for this series.
pub fn efficient_trim(values: &[(i64, f64)], start: i64, end: Option<i64>, expected_resolution_ms: i64) -> Vec<(i64, f64)> {
    if values.is_empty() || expected_resolution_ms <= 0 {
        return Vec::new();
    }

    let last_ts = values[values.len() - 1].0;
    let len = values.len() as i64;

    let start_from_end = (last_ts - start * 1000) / expected_resolution_ms;
    let start_from_start = (len - start_from_end - 1).clamp(0, len) as usize;

    match end {
        None => values[start_from_start..].to_vec(),
        Some(end) => {
            let end_from_end = (last_ts - end * 1000) / expected_resolution_ms;
            let end_from_start = (len - end_from_end).clamp(0, len) as usize;
            let end_idx = end_from_start.max(start_from_start);
            values[start_from_start..end_idx].to_vec()
        }
    }
}

/// True when `|expected_count - actual_count| <= acceptable_skew`, where
/// both are expressed as the number of sampling intervals spanned by the
/// series. Guards `efficient_trim` against sparse/gappy series.
pub fn conforms_to_efficient_constraints(values: &[(i64, f64)], expected_resolution_ms: i64, acceptable_skew: i64) -> bool {
    if values.len() < 2 || expected_resolution_ms <= 0 {
        return true;
    }
    let first_ts = values[0].0;
    let last_ts = values[values.len() - 1].0;
    let expected_intervals = (last_ts - first_ts) / expected_resolution_ms;
    let actual_intervals = values.len() as i64 - 1;
    (expected_intervals - actual_intervals).abs() <= acceptable_skew
}

/// If the series' oldest point is older than `gc_expiry` seconds, truncate
/// to points within the last `expiry` seconds and return the new earliest
/// instant (Unix seconds) so the owning KQuery can advance
/// `earliest_data`. Returns `None` when no truncation was needed.
pub fn ttl_expire(values: &mut Vec<(i64, f64)>, now: i64, gc_expiry: i64, expiry: i64) -> Option<i64> {
    let first_ts = values.first()?.0;
    let oldest_age = now - first_ts / 1000;
    if oldest_age <= gc_expiry {
        return None;
    }
    let cutoff_ms = (now - expiry) * 1000;
    values.retain(|(ts, _)| *ts >= cutoff_ms);
    values.first().map(|(ts, _)| ts / 1000)
}

/// Compute the window the caller should see, trimming with the cheaper
/// offset-arithmetic path when the series is uniform enough, and append it
/// (as an independent copy) to the response accumulator.
pub fn build_response(mts: &Mts, start: i64, end: Option<i64>, expected_resolution_ms: i64, trim: bool, acc: &mut QueryResult) {
    let values = if trim {
        if conforms_to_efficient_constraints(&mts.values, expected_resolution_ms, DEFAULT_ACCEPTABLE_SKEW) {
            efficient_trim(&mts.values, start, end, expected_resolution_ms)
        } else {
            robust_trim(&mts.values, start, end)
        }
    } else {
        mts.values.clone()
    };

    acc.sample_size += values.len();
    acc.results.push(SeriesResult {
        name: mts.name.clone(),
        tags: mts.tags.clone(),
        group_by: mts.group_by.clone(),
        aggregators: mts.aggregators.clone(),
        values,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_at_end_no_overlap_concatenates() {
        let mut cached = vec![(1000, 1.0), (2000, 2.0)];
        let new = vec![(3000, 3.0), (4000, 4.0)];
        let outcome = merge_at_end(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Merged { dropped: 0 });
        assert_eq!(cached, vec![(1000, 1.0), (2000, 2.0), (3000, 3.0), (4000, 4.0)]);
    }

    #[test]
    fn merge_at_end_single_overlap_new_wins() {
        let mut cached = vec![(1000, 1.0), (2000, 2.0)];
        let new = vec![(2000, 99.0), (3000, 3.0)];
        let outcome = merge_at_end(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Merged { dropped: 1 });
        assert_eq!(cached, vec![(1000, 1.0), (2000, 99.0), (3000, 3.0)]);
    }

    #[test]
    fn merge_at_end_identical_series_is_noop() {
        let mut cached = vec![(1000, 1.0), (2000, 2.0), (3000, 3.0)];
        let new = vec![(2000, 2.0), (3000, 3.0)];
        let outcome = merge_at_end(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Merged { dropped: 2 });
        assert_eq!(cached, vec![(1000, 1.0), (2000, 2.0), (3000, 3.0)]);
    }

    #[test]
    fn merge_at_end_timestamps_stay_non_decreasing() {
        let mut cached = vec![(1000, 1.0), (2000, 2.0)];
        let new = vec![(2500, 2.5), (3000, 3.0)];
        merge_at_end(&mut cached, &new);
        for pair in cached.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
        assert_eq!(cached.last().unwrap().0, 3000);
    }

    #[test]
    fn merge_at_end_replaces_when_cached_too_short() {
        let mut cached = vec![(5000, 5.0)];
        let new = vec![(1000, 1.0), (2000, 2.0)];
        let outcome = merge_at_end(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Replaced);
        assert_eq!(cached, new);
    }

    #[test]
    fn merge_at_end_aborts_when_new_is_entirely_older() {
        let cached_points: Vec<(i64, f64)> = (0..12).map(|i| ((i + 100) * 1000, i as f64)).collect();
        let mut cached = cached_points.clone();
        let new = vec![(1000, 0.0)];
        let outcome = merge_at_end(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Aborted);
        assert_eq!(cached, cached_points);
    }

    #[test]
    fn merge_at_beginning_no_overlap_prepends() {
        let mut cached = vec![(3000, 3.0), (4000, 4.0)];
        let new = vec![(1000, 1.0), (2000, 2.0)];
        let outcome = merge_at_beginning(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Merged { dropped: 0 });
        assert_eq!(cached, vec![(1000, 1.0), (2000, 2.0), (3000, 3.0), (4000, 4.0)]);
    }

    #[test]
    fn merge_at_beginning_single_overlap_new_wins() {
        let mut cached = vec![(2000, 99.0), (3000, 3.0)];
        let new = vec![(1000, 1.0), (2000, 2.0)];
        let outcome = merge_at_beginning(&mut cached, &new);
        assert_eq!(outcome, MergeOutcome::Merged { dropped: 1 });
        assert_eq!(cached, vec![(1000, 1.0), (2000, 2.0), (3000, 3.0)]);
    }

    #[test]
    fn robust_and_efficient_trim_agree_on_uniform_series() {
        let values: Vec<(i64, f64)> = (0..20).map(|i| (i * 10_000, i as f64)).collect();
        assert!(conforms_to_efficient_constraints(&values, 10_000, DEFAULT_ACCEPTABLE_SKEW));

        let robust = robust_trim(&values, 50, Some(120));
        let efficient = efficient_trim(&values, 50, Some(120), 10_000);
        assert_eq!(robust, efficient);
    }

    #[test]
    fn robust_trim_handles_open_ended_window() {
        let values: Vec<(i64, f64)> = (0..10).map(|i| (i * 1000, i as f64)).collect();
        let trimmed = robust_trim(&values, 5, None);
        assert_eq!(trimmed, vec![(5000, 5.0), (6000, 6.0), (7000, 7.0), (8000, 8.0), (9000, 9.0)]);
    }

    #[test]
    fn conforms_to_efficient_constraints_rejects_gappy_series() {
        let mut values: Vec<(i64, f64)> = (0..20).map(|i| (i * 10_000, i as f64)).collect();
        values.retain(|(ts, _)| *ts < 50_000 || *ts > 150_000);
        assert!(!conforms_to_efficient_constraints(&values, 10_000, DEFAULT_ACCEPTABLE_SKEW));
    }

    #[test]
    fn ttl_expire_truncates_past_gc_threshold() {
        let now = 20_000;
        let mut values = vec![(0, 0.0), (5_000_000, 5.0), (now * 1000, 20.0)];
        let truncated = ttl_expire(&mut values, now, 100, 10_000);
        assert_eq!(truncated, Some(20_000));
        assert_eq!(values, vec![(20_000_000, 20.0)]);
    }

    #[test]
    fn ttl_expire_is_noop_within_gc_threshold() {
        let now = 20_000;
        let mut values = vec![(15_000_000, 15.0), (20_000_000, 20.0)];
        let truncated = ttl_expire(&mut values, now, DEFAULT_GC_EXPIRY_SECONDS, DEFAULT_TTL_SECONDS);
        assert_eq!(truncated, None);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn build_response_accumulates_sample_size() {
        let mts = Mts {
            name: "cpu".into(),
            tags: serde_json::Map::new(),
            group_by: None,
            aggregators: vec![],
            values: (0..10).map(|i| (i * 10_000, i as f64)).collect(),
        };
        let mut acc = QueryResult::default();
        build_response(&mts, 2, Some(5), 10_000, true, &mut acc);
        assert_eq!(acc.results.len(), 1);
        assert_eq!(acc.sample_size, acc.results[0].values.len());
        assert_eq!(mts.values.len(), 10, "source series must not be mutated");
    }
}

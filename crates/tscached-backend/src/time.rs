//! Time & range utilities (C1).
//!
//! Resolves the relative/absolute time window carried on a query request
//! into absolute Unix-second instants, and decides what (if any) range
//! still needs to be fetched from the backend against what the cache
//! already covers.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unit of relative time. Fixed conversions only: months = 31 days,
/// years = 365 days. No calendar or timezone awareness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    fn seconds_per_unit(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
            TimeUnit::Weeks => 604_800,
            TimeUnit::Months => 31 * 86_400,
            TimeUnit::Years => 365 * 86_400,
        }
    }
}

/// `value` arrives as either a JSON string or a JSON number on the wire
/// (KairosDB-compatible clients send both in the wild).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FlexInt {
    Str(String),
    Num(i64),
}

impl FlexInt {
    fn as_i64(&self) -> i64 {
        match self {
            FlexInt::Str(s) => s.parse().unwrap_or(0),
            FlexInt::Num(n) => *n,
        }
    }
}

/// A `{value, unit}` relative time span, e.g. `{"value": "15", "unit": "minutes"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelativeTime {
    pub value: FlexInt,
    pub unit: TimeUnit,
}

impl RelativeTime {
    pub fn as_seconds(&self) -> i64 {
        self.value.as_i64() * self.unit.seconds_per_unit()
    }
}

/// The temporal portion of an incoming query request. Any subset of these
/// four fields may be present; see `resolve_window` for precedence rules.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_relative: Option<RelativeTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_relative: Option<RelativeTime>,
    /// Milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_absolute: Option<i64>,
    /// Milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_absolute: Option<i64>,
}

/// A window resolved to absolute Unix-second instants. Sub-second
/// resolution is dropped deliberately (spec: no sub-second support).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: i64,
    pub end: i64,
}

pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs() as i64
}

/// Resolve a request's time fields to absolute instants. Absolute wins
/// over relative; a missing end resolves to `now`.
pub fn resolve_window(req: &RequestWindow, now: i64) -> ResolvedWindow {
    let start = match req.start_absolute {
        Some(ms) => ms / 1000,
        None => now - req.start_relative.as_ref().map(RelativeTime::as_seconds).unwrap_or(0),
    };

    let end = match req.end_absolute {
        Some(ms) => ms / 1000,
        None => match &req.end_relative {
            Some(rel) => now - rel.as_seconds(),
            None => now,
        },
    };

    ResolvedWindow { start, end }
}

/// Outcome of comparing a request's window against what the cache covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeNeeded {
    /// Cache fully covers the request; no backend call needed.
    NoneNeeded,
    /// Nothing usable cached (or cache state is malformed); fetch the
    /// whole request window.
    FetchAll { start: i64, end: i64 },
    /// Cache covers the start but is missing the tail.
    FetchAfter { start: i64, end: i64 },
    /// Cache covers the tail but is missing the head.
    FetchBefore { start: i64, end: i64 },
}

/// Classify what (if anything) needs fetching. `cache` is `None` when
/// there is no cached record, or when the caller has already determined
/// the cached bounds are malformed (e.g. `start_cache > end_cache`).
///
/// `window_size` is accepted for forward compatibility with callers that
/// want to factor the nominal bucket width into the decision; the
/// classification table in the spec this implements does not consult it.
pub fn get_range_needed(
    start_req: i64,
    end_req: i64,
    cache: Option<(i64, i64)>,
    staleness_threshold: i64,
    _window_size: Option<i64>,
) -> RangeNeeded {
    let (start_cache, end_cache) = match cache {
        Some((s, e)) if s <= e => (s, e),
        _ => return RangeNeeded::FetchAll { start: start_req, end: end_req },
    };

    let covers_start = start_cache <= start_req;
    let covers_end = end_cache >= end_req;

    match (covers_start, covers_end) {
        (true, true) => RangeNeeded::NoneNeeded,
        (true, false) => {
            if end_req - end_cache < staleness_threshold {
                RangeNeeded::NoneNeeded
            } else {
                RangeNeeded::FetchAfter { start: end_cache.max(start_req), end: end_req }
            }
        }
        (false, true) => {
            RangeNeeded::FetchBefore { start: start_req, end: start_cache.min(end_req) }
        }
        (false, false) => RangeNeeded::FetchAll { start: start_req, end: end_req },
    }
}

/// Split `[start, end]` into newest-first chunks of `chunk_length` seconds.
/// Adjacent chunks share their boundary instant (chunk `i`'s start equals
/// chunk `i+1`'s end) — this is the intentional one-second overlap the
/// seam merge is built to resolve. The oldest chunk is clamped to `start`
/// and may be shorter than `chunk_length`.
///
/// Whether the backend's start-time-aligned aggregation actually produces
/// identical bucket boundaries across chunks sharing this instant (so the
/// merge sees a clean duplicate rather than two different partial-window
/// values) is an assumption carried over from the source design, not
/// verified here.
pub fn get_chunked_time_ranges(chunk_length: i64, start: i64, end: i64) -> Vec<(i64, i64)> {
    assert!(chunk_length > 0, "chunk_length must be positive");

    if end <= start {
        return vec![(start, end)];
    }

    let mut chunks = Vec::new();
    let mut chunk_end = end;

    loop {
        let naive_start = chunk_end - chunk_length;
        if naive_start <= start {
            chunks.push((start, chunk_end));
            break;
        }
        chunks.push((naive_start, chunk_end));
        chunk_end = naive_start;
    }

    chunks
}

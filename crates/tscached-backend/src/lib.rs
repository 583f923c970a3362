pub mod error;
pub mod kairos;
pub mod keys;
pub mod time;
pub mod types;

pub use error::{BackendError, Result};
pub use kairos::{KairosClient, KairosConfig};
pub use keys::{
    cache_key, fingerprint, mts_key_basis, normalize_aggregators, Aggregator, CacheKind, MetricQuery,
    SHADOW_LIST_KEY, SHADOW_LOCK_KEY, SHADOW_SERVER_KEY,
};
pub use time::{
    get_chunked_time_ranges, get_range_needed, now_unix_seconds, resolve_window, FlexInt, RangeNeeded,
    RelativeTime, RequestWindow, ResolvedWindow, TimeUnit,
};
pub use types::{BackendErrorBody, BackendResponse, ChunkResult, QueryResult, SeriesResult};

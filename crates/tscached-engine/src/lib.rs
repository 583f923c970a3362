pub mod coherence;
pub mod dispatch;
pub mod error;
pub mod kquery;
pub mod mts;

pub use coherence::{process_cache_hit, CacheMode, EngineConfig};
pub use dispatch::{handle_request, ResponseMode};
pub use error::{EngineError, Result};
pub use kquery::{DatapointsQueryRequest, KQuery};
pub use mts::{merge_at_beginning, merge_at_end, Mts};

//! Errors raised by the coherence engine, distinguishing failures that must
//! abort a whole request from failures that only degrade a single query.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend fetch failed: {0}")]
    BackendFailure(#[from] tscached_backend::BackendError),

    #[error("cache operation failed: {0}")]
    CacheFailure(#[from] tscached_cache::CacheError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

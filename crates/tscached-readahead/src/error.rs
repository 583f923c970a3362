use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadaheadError {
    #[error("cache operation failed: {0}")]
    Cache(#[from] tscached_cache::CacheError),

    #[error("coherence pass failed: {0}")]
    Engine(#[from] tscached_engine::EngineError),
}

pub type Result<T> = std::result::Result<T, ReadaheadError>;

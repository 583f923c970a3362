use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("kv-store error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock held by another owner")]
    LockContended,
}

pub type Result<T> = std::result::Result<T, CacheError>;

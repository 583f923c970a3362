pub mod backend;
pub mod error;
pub mod memory_backend;
pub mod redis_backend;

pub use backend::{CacheBackend, CacheBackendExt};
pub use error::{CacheError, Result};
pub use memory_backend::InMemoryBackend;
pub use redis_backend::RedisBackend;

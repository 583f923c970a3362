//! The KV-store facade (C3): a small async trait wide enough to run the
//! coherence engine against either real Redis or an in-process double.

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Batched get, order-preserving, one `None` per miss. Used for the
    /// HOT-path multi-key MTS fetch.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Batched set; all entries get their own TTL in one round trip.
    async fn set_many(&self, items: &[(String, Vec<u8>, Duration)]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Drops every key in the store. Gated at the HTTP layer behind the
    /// shadow lock so only the elected leader can run it.
    async fn flush_all(&self) -> Result<()>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Best-effort mutual exclusion: `SET key owner NX EX ttl`. Returns
    /// `false` immediately on contention — no in-process retry.
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Releases the lock only if `owner` still holds it.
    async fn unlock(&self, key: &str, owner: &str) -> Result<()>;
}

/// Typed convenience helpers layered over the raw byte operations.
#[async_trait]
pub trait CacheBackendExt: CacheBackend {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes, ttl).await
    }

    async fn get_many_json<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>> {
        let raw = self.get_many(keys).await?;
        raw.into_iter()
            .map(|entry| entry.map(|bytes| serde_json::from_slice(&bytes)).transpose().map_err(Into::into))
            .collect()
    }
}

impl<T: CacheBackend + ?Sized> CacheBackendExt for T {}

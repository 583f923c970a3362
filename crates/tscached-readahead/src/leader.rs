//! Leader election (C7): a single read-ahead worker at a time does the
//! work, using the cache's distributed lock as the coordination point.
//!
//! Mirrors `become_leader`/`release_leader` from the original worker: one
//! fail-fast `try_lock` attempt, no in-process retry on contention, plus a
//! diagnostic key recording who holds the lock.

use crate::config::ReadaheadConfig;
use crate::error::Result;
use tscached_backend::{SHADOW_LOCK_KEY, SHADOW_SERVER_KEY};
use tscached_cache::CacheBackend;

/// A held leadership lease. Dropping this without calling `release` leaves
/// the lock to expire on its own TTL — matching the original's "let it
/// expire on crash" behavior.
pub struct Lease {
    owner: String,
}

impl Lease {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Attempt to become the read-ahead leader. `owner` is typically the local
/// hostname, written to `SHADOW_SERVER_KEY` purely for operator visibility.
pub async fn become_leader<C: CacheBackend + ?Sized>(cache: &C, config: &ReadaheadConfig, owner: &str) -> Result<Option<Lease>> {
    let acquired = cache.try_lock(SHADOW_LOCK_KEY, owner, config.leader_expiration).await?;
    if !acquired {
        return Ok(None);
    }
    cache.set(SHADOW_SERVER_KEY, owner.as_bytes().to_vec(), config.leader_expiration).await?;
    tracing::info!(owner, "read-ahead lock acquired");
    Ok(Some(Lease { owner: owner.to_string() }))
}

pub async fn release_leader<C: CacheBackend + ?Sized>(cache: &C, lease: &Lease) -> Result<()> {
    cache.unlock(SHADOW_LOCK_KEY, &lease.owner).await?;
    cache.delete(SHADOW_SERVER_KEY).await?;
    tracing::info!(owner = %lease.owner, "read-ahead lock released");
    Ok(())
}

/// The local hostname, used as the lock owner / diagnostic value.
pub fn local_owner() -> String {
    hostname::get().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "unknown-host".into())
}

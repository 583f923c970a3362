//! An in-process `CacheBackend` double, used by engine/readahead tests so
//! they don't need a live Redis.

use crate::backend::CacheBackend;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

struct Lock {
    owner: String,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    sets: HashMap<String, HashSet<String>>,
    locks: HashMap<String, Lock>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.get(key) {
            if entry.is_expired() {
                state.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(key.to_string(), Entry { value, expires_at: Some(Instant::now() + ttl) });
        Ok(())
    }

    async fn set_many(&self, items: &[(String, Vec<u8>, Duration)]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for (key, value, ttl) in items {
            state
                .entries
                .insert(key.clone(), Entry { value: value.clone(), expires_at: Some(Instant::now() + *ttl) });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.lock().unwrap().entries.remove(key);
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.sets.clear();
        state.locks.clear();
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        if let Some(existing) = state.locks.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        state.locks.insert(key.to_string(), Lock { owner: owner.to_string(), expires_at: now + ttl });
        Ok(true)
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.locks.get(key).map(|lock| lock.owner == owner).unwrap_or(false) {
            state.locks.remove(key);
        }
        Ok(())
    }
}

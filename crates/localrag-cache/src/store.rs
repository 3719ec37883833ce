use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Shared key/value store with expiry, used for both cached values and lock markers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Atomically create `key` unless a live entry exists. Returns whether it was created.
    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: &str, ttl: Duration) -> Self { Self { value: value.to_string(), expires_at: Instant::now() + ttl } }

    fn is_expired(&self) -> bool { Instant::now() >= self.expires_at }
}

/// In-process store. Expired entries read as absent and are dropped lazily.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Slot>,
}

impl MemoryCache {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.iter().filter(|e| !e.is_expired()).count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let live = self.entries.get(key).and_then(|e| (!e.is_expired()).then(|| e.value.clone()));
        if live.is_none() {
            self.entries.remove_if(key, |_, e| e.is_expired());
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) if e.get().is_expired() => {
                e.insert(Slot::new(value, ttl));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(Slot::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conditional_create_respects_live_entries() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_not_exists("lock:a", "1", Duration::from_secs(30)).await.unwrap());
        assert!(!cache.set_if_not_exists("lock:a", "1", Duration::from_secs(30)).await.unwrap());
        cache.delete("lock:a").await.unwrap();
        assert!(cache.set_if_not_exists("lock:a", "1", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
        assert!(cache.set_if_not_exists("k", "w", Duration::from_secs(1)).await.unwrap());
    }
}

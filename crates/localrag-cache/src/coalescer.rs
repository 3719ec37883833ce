use anyhow::Result;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use localrag_core::config::CacheSettings;
use localrag_core::Error;

use crate::keys;
use crate::store::CacheStore;

/// Single-flight wrapper over a [`CacheStore`].
///
/// The first caller on a cold key takes an advisory `lock:<key>` marker and
/// computes; concurrent callers wait for the cached value. Followers in the
/// same process are woken as soon as the leader finishes and otherwise poll.
/// A leader slower than the lock TTL lets a second leader start.
pub struct QueryCoalescer {
    store: Arc<dyn CacheStore>,
    lock_ttl: Duration,
    poll_interval: Duration,
    max_polls: u32,
    waiters: DashMap<String, Arc<Notify>>,
}

impl QueryCoalescer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::from_settings(store, &CacheSettings::default())
    }

    pub fn from_settings(store: Arc<dyn CacheStore>, settings: &CacheSettings) -> Self {
        Self {
            store,
            lock_ttl: Duration::from_secs(settings.lock_ttl_secs),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            max_polls: settings.max_polls,
            waiters: DashMap::new(),
        }
    }

    pub fn with_poll(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> { &self.store }

    /// Return the cached value for `key`, or compute, cache (for `ttl`) and return it.
    ///
    /// Fails with [`Error::CoalescingTimeout`] when another caller holds the
    /// lock and no value appears within the poll budget. A failed computation
    /// is not cached; a follower that sees the lock released without a value
    /// takes over as leader.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock_key = keys::lock(key);
        let mut polls_left = self.max_polls;
        loop {
            if let Some(hit) = self.store.get(key).await? {
                debug!(key, "cache hit");
                return Ok(serde_json::from_str(&hit)?);
            }
            if self.store.set_if_not_exists(&lock_key, "1", self.lock_ttl).await? {
                let lock = LeaderLock { coalescer: self, key, lock_key, held: true };
                info!(key, "cache miss, computing");
                let outcome = self.lead(key, ttl, compute).await;
                let released = lock.release().await;
                if let Err(e) = &outcome {
                    warn!(key, error = %e, "computation failed");
                }
                let value = outcome?;
                released?;
                return Ok(value);
            }
            if let Some(value) = self.follow(key, &lock_key, &mut polls_left).await? {
                return Ok(value);
            }
            debug!(key, "lock released without a value, retrying");
        }
    }

    /// Keys with followers currently registered for an in-process wake-up.
    pub fn waiting_keys(&self) -> usize { self.waiters.len() }

    async fn lead<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = compute().await?;
        self.store.set(key, &serde_json::to_string(&value)?, ttl).await?;
        Ok(value)
    }

    fn wake(&self, key: &str) {
        if let Some((_, notify)) = self.waiters.remove(key) {
            notify.notify_waiters();
        }
    }

    /// Wait for the leader's value. `None` means the lock went away without
    /// one; the shared poll budget is left in `polls_left`.
    async fn follow<T: DeserializeOwned>(&self, key: &str, lock_key: &str, polls_left: &mut u32) -> Result<Option<T>> {
        let waiter = Waiter::register(&self.waiters, key);
        debug!(key, "lock held elsewhere, waiting");
        while *polls_left > 0 {
            *polls_left -= 1;
            let notified = waiter.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Some(hit) = self.store.get(key).await? {
                debug!(key, polls_left = *polls_left, "follower got cached value");
                return Ok(Some(serde_json::from_str(&hit)?));
            }
            if self.store.get(lock_key).await?.is_none() {
                return Ok(None);
            }
        }
        warn!(key, attempts = self.max_polls, "gave up waiting for cached value");
        Err(Error::CoalescingTimeout { key: key.to_string(), attempts: self.max_polls }.into())
    }
}

/// The leader's hold on `lock:<key>`. Dropped without [`LeaderLock::release`]
/// (the computation panicked or the caller stopped polling), it still deletes
/// the marker on the runtime and wakes local followers.
struct LeaderLock<'a> {
    coalescer: &'a QueryCoalescer,
    key: &'a str,
    lock_key: String,
    held: bool,
}

impl LeaderLock<'_> {
    async fn release(mut self) -> Result<()> {
        let released = self.coalescer.store.delete(&self.lock_key).await;
        self.held = false;
        self.coalescer.wake(self.key);
        released
    }
}

impl Drop for LeaderLock<'_> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let store = Arc::clone(&self.coalescer.store);
        let lock_key = std::mem::take(&mut self.lock_key);
        // followers are woken only once the lock is gone so they can take over
        let waiting = self.coalescer.waiters.remove(self.key).map(|(_, notify)| notify);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(key = self.key, "leader exited early, releasing lock");
                handle.spawn(async move {
                    if let Err(e) = store.delete(&lock_key).await {
                        warn!(lock = %lock_key, error = %e, "failed to release abandoned lock");
                    }
                    if let Some(notify) = waiting {
                        notify.notify_waiters();
                    }
                });
            }
            Err(_) => {
                warn!(lock = %lock_key, "no runtime to release abandoned lock, left to expire");
                if let Some(notify) = waiting {
                    notify.notify_waiters();
                }
            }
        }
    }
}

/// A follower's registration in the wake-up map. The last follower out
/// removes the entry.
struct Waiter<'a> {
    waiters: &'a DashMap<String, Arc<Notify>>,
    key: &'a str,
    notify: Arc<Notify>,
}

impl<'a> Waiter<'a> {
    fn register(waiters: &'a DashMap<String, Arc<Notify>>, key: &'a str) -> Self {
        let notify = Arc::clone(waiters.entry(key.to_string()).or_insert_with(|| Arc::new(Notify::new())).value());
        Self { waiters, key, notify }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        // map + this follower: nobody else is waiting on this Notify
        self.waiters.remove_if(self.key, |_, n| Arc::ptr_eq(n, &self.notify) && Arc::strong_count(n) == 2);
    }
}

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::store::CacheStore;

#[cfg_attr(not(feature = "redis"), allow(dead_code))]
fn ttl_secs(ttl: Duration) -> u64 { ttl.as_secs().max(1) }

/// Redis-backed store shared across processes (requires the `redis` feature).
///
/// Uses `GET`, `SET .. EX`, `SET .. NX EX` and `DEL` over a multiplexed
/// connection. When the feature is disabled, construction fails.
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!(url, "connected to redis cache");
        Ok(Self { conn })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs(ttl)).query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_if_not_exists(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> =
            redis::cmd("SET").arg(key).arg(value).arg("NX").arg("EX").arg(ttl_secs(ttl)).query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(not(feature = "redis"))]
#[derive(Debug, Clone)]
pub struct RedisCache;

#[cfg(not(feature = "redis"))]
impl RedisCache {
    pub async fn connect(_url: &str) -> Result<Self> {
        anyhow::bail!("Redis cache requires the 'redis' Cargo feature")
    }
}

#[cfg(not(feature = "redis"))]
#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        anyhow::bail!("Redis cache requires the 'redis' Cargo feature")
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        anyhow::bail!("Redis cache requires the 'redis' Cargo feature")
    }

    async fn set_if_not_exists(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool> {
        anyhow::bail!("Redis cache requires the 'redis' Cargo feature")
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        anyhow::bail!("Redis cache requires the 'redis' Cargo feature")
    }
}

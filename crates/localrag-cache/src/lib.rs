//! localrag-cache
//!
//! Shared cache/lock stores and the query coalescer that keeps at most one
//! computation per key in flight.
pub mod coalescer;
pub mod keys;
pub mod redis_store;
pub mod store;

pub use coalescer::QueryCoalescer;
pub use redis_store::RedisCache;
pub use store::{CacheStore, MemoryCache};

//! # State Storage
//!
//! Backing store access for the matchmaking logic API. Player attributes live
//! in sorted sets keyed by attribute name (member = player id, score = value),
//! ignore lists are sorted sets scored by insertion time, and profiles and
//! proposals are plain hashes, strings and sets.
//!
//! ## Components
//!
//! - [`StoreConnection`] / [`Connector`]: the command surface every backend provides
//! - [`ConnectionPool`]: bounded pool handing out RAII [`PooledConnection`] guards
//! - [`MemoryStore`]: in-process backend with call accounting and failure injection
//! - `RedisConnector`: Redis backend (feature `redis-backend`)
//! - [`ignorelist`]: append/retrieve primitive over timestamp-scored sets

pub mod connection;
pub mod error;
pub mod ignorelist;
pub mod memory;
pub mod pool;
#[cfg(feature = "redis-backend")]
pub mod redis_store;

pub use connection::{Connector, ScoreRange, StoreConnection};
pub use error::{Result, StoreError};
pub use memory::{MemoryConnector, MemoryStore};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisConnector;

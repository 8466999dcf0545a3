//! Bounded connection pool
//!
//! Connections are opened lazily up to `max_size` and reused afterwards.
//! Every checkout is an RAII [`PooledConnection`]: dropping it, whether the
//! caller returned normally, bailed out with `?`, or was cancelled mid-await,
//! puts the connection back and releases its permit.

use crate::connection::{Connector, StoreConnection};
use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections open at once
    pub max_size: usize,

    /// How long `acquire` waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub created: usize,
}

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    idle: Mutex<Vec<Box<dyn StoreConnection>>>,
    permits: Arc<Semaphore>,
    config: PoolConfig,
    created: AtomicUsize,
    in_use: AtomicUsize,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("backend", &self.connector.name())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(config.max_size)),
            permits: Arc::new(Semaphore::new(config.max_size)),
            config,
            created: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
        })
    }

    pub fn backend(&self) -> &str {
        self.connector.name()
    }

    /// Check out a connection, opening one if none is idle
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            warn!(
                backend = self.connector.name(),
                max_size = self.config.max_size,
                "Connection pool exhausted"
            );
            StoreError::PoolTimeout {
                waited_ms: self.config.acquire_timeout.as_millis() as u64,
            }
        })?
        .map_err(|_| StoreError::PoolClosed)?;

        let reused = self.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                let conn = self.connector.connect().await?;
                let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(backend = self.connector.name(), created, "Opened store connection");
                conn
            }
        };

        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_size: self.config.max_size,
            idle: self.idle.lock().len(),
            in_use: self.in_use.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
        }
    }

    /// Refuse new checkouts and drop idle connections
    pub fn close(&self) {
        self.permits.close();
        self.idle.lock().clear();
    }

    fn release(&self, conn: Box<dyn StoreConnection>) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        if conn.is_healthy() && !self.permits.is_closed() {
            self.idle.lock().push(conn);
        } else {
            debug!(backend = self.connector.name(), "Discarding store connection");
        }
    }
}

/// RAII guard returning its connection to the pool when dropped
pub struct PooledConnection {
    conn: Option<Box<dyn StoreConnection>>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("backend", &self.pool.backend())
            .field("released", &self.conn.is_none())
            .finish()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection used after release")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("connection used after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

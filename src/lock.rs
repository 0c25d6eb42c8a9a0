//! Per-instrument mutual exclusion. The matching core only sees the
//! `InstrumentLock` capability; a single-process deployment uses the local
//! mutex table, a multi-instance deployment uses the Redis lease.
//!
//! Both impls bound the wait to acquire (timeout is fatal for the caller)
//! and the Redis lease additionally bounds the hold time, so a crashed
//! holder cannot deadlock an instrument permanently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::OwnedMutexGuard;
use tracing::warn;
use uuid::Uuid;

use crate::error::TradingError;

/// An acquired critical section. Call `release` when done; an unreleased
/// Redis lease is reclaimed when its TTL expires.
#[async_trait]
pub trait LockLease: Send {
    async fn release(self: Box<Self>);
}

#[async_trait]
pub trait InstrumentLock: Send + Sync {
    async fn acquire(&self, stock_id: &str) -> Result<Box<dyn LockLease>, TradingError>;
}

// --- local (single-process) ---

pub struct LocalInstrumentLock {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    wait: Duration,
}

impl LocalInstrumentLock {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    fn lock_for(&self, stock_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(stock_id.to_string()).or_default().clone()
    }
}

impl Default for LocalInstrumentLock {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

struct LocalLease {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockLease for LocalLease {
    async fn release(self: Box<Self>) {}
}

#[async_trait]
impl InstrumentLock for LocalInstrumentLock {
    async fn acquire(&self, stock_id: &str) -> Result<Box<dyn LockLease>, TradingError> {
        let lock = self.lock_for(stock_id);
        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(Box::new(LocalLease { _guard: guard })),
            Err(_) => Err(TradingError::LockTimeout {
                stock_id: stock_id.to_string(),
                waited_ms: self.wait.as_millis() as u64,
            }),
        }
    }
}

// --- distributed (Redis lease) ---

const ACQUIRE_POLL: Duration = Duration::from_millis(50);

pub struct RedisInstrumentLock {
    conn: ConnectionManager,
    wait: Duration,
    hold: Duration,
}

impl RedisInstrumentLock {
    pub fn new(conn: ConnectionManager, wait: Duration, hold: Duration) -> Self {
        Self { conn, wait, hold }
    }

    fn key(stock_id: &str) -> String {
        format!("lock:orderbook:{stock_id}")
    }
}

struct RedisLease {
    conn: ConnectionManager,
    key: String,
    token: String,
}

#[async_trait]
impl LockLease for RedisLease {
    async fn release(self: Box<Self>) {
        // Compare-and-delete so an expired lease taken over by another
        // holder is never deleted by us.
        let script = redis::Script::new(
            "if redis.call('get', KEYS[1]) == ARGV[1] then \
                 return redis.call('del', KEYS[1]) \
             else \
                 return 0 \
             end",
        );
        let mut conn = self.conn.clone();
        let released: Result<i32, _> = script
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await;
        if let Err(err) = released {
            warn!(key = %self.key, error = %err, "failed to release instrument lock, lease will expire");
        }
    }
}

#[async_trait]
impl InstrumentLock for RedisInstrumentLock {
    async fn acquire(&self, stock_id: &str) -> Result<Box<dyn LockLease>, TradingError> {
        let key = Self::key(stock_id);
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.wait;
        let mut conn = self.conn.clone();

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(self.hold.as_millis() as u64)
                .query_async(&mut conn)
                .await?;
            if acquired.is_some() {
                return Ok(Box::new(RedisLease {
                    conn: self.conn.clone(),
                    key,
                    token,
                }));
            }
            if tokio::time::Instant::now() + ACQUIRE_POLL > deadline {
                return Err(TradingError::LockTimeout {
                    stock_id: stock_id.to_string(),
                    waited_ms: self.wait.as_millis() as u64,
                });
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }
}

//! Book cache port: resting entries and a denormalized snapshot per stock,
//! so a restarted process can rebuild a book without replaying order
//! history. Redis is the deployed substrate; the in-memory impl backs
//! tests and single-process runs.
//!
//! Loads degrade: a cache failure means "start from an empty book", never
//! an aborted command. Writes log failures and move on -- the in-memory
//! book already holds the truth for this instance.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::warn;

use crate::error::TradingError;
use crate::orderbook::{BookEntry, OrderBookSnapshot};
use crate::types::order::OrderSide;

#[async_trait]
pub trait BookCache: Send + Sync {
    async fn save_entries(
        &self,
        stock_id: &str,
        side: OrderSide,
        entries: &[BookEntry],
    ) -> Result<(), TradingError>;

    async fn load_entries(
        &self,
        stock_id: &str,
        side: OrderSide,
    ) -> Result<Vec<BookEntry>, TradingError>;

    async fn save_snapshot(
        &self,
        stock_id: &str,
        snapshot: &OrderBookSnapshot,
    ) -> Result<(), TradingError>;
}

fn side_key(stock_id: &str, side: OrderSide) -> String {
    let side_name = match side {
        OrderSide::Buy => "bids",
        OrderSide::Sell => "asks",
    };
    format!("orderbook:{stock_id}:{side_name}")
}

// --- Redis ---

pub struct RedisBookCache {
    conn: ConnectionManager,
}

impl RedisBookCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl BookCache for RedisBookCache {
    async fn save_entries(
        &self,
        stock_id: &str,
        side: OrderSide,
        entries: &[BookEntry],
    ) -> Result<(), TradingError> {
        let key = side_key(stock_id, side);
        let mut conn = self.conn.clone();

        // Replace the whole side: the book is small and the write happens
        // inside the instrument critical section, so readers only ever see
        // a completed mutation.
        let _: () = conn.del(&key).await?;
        if entries.is_empty() {
            return Ok(());
        }
        let fields: Vec<(String, String)> = entries
            .iter()
            .map(|e| Ok((e.order_id.to_string(), serde_json::to_string(e)?)))
            .collect::<Result<_, TradingError>>()?;
        let _: () = conn.hset_multiple(&key, &fields).await?;
        Ok(())
    }

    async fn load_entries(
        &self,
        stock_id: &str,
        side: OrderSide,
    ) -> Result<Vec<BookEntry>, TradingError> {
        let key = side_key(stock_id, side);
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&key).await?;

        let mut entries = Vec::with_capacity(raw.len());
        for (order_id, value) in raw {
            match serde_json::from_str::<BookEntry>(&value) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(%order_id, %err, "skipping unparseable cached book entry");
                }
            }
        }
        // Hash iteration order is arbitrary; re-establish arrival order so
        // restore() preserves time priority within a level.
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    async fn save_snapshot(
        &self,
        stock_id: &str,
        snapshot: &OrderBookSnapshot,
    ) -> Result<(), TradingError> {
        let key = format!("orderbook:{stock_id}:snapshot");
        let mut conn = self.conn.clone();
        let value = serde_json::to_string(snapshot)?;
        let _: () = conn.set(&key, value).await?;
        Ok(())
    }
}

// --- in-memory ---

#[derive(Default)]
pub struct MemoryBookCache {
    entries: tokio::sync::Mutex<HashMap<(String, OrderSide), Vec<BookEntry>>>,
    snapshots: tokio::sync::Mutex<HashMap<String, OrderBookSnapshot>>,
}

impl MemoryBookCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot_for(&self, stock_id: &str) -> Option<OrderBookSnapshot> {
        self.snapshots.lock().await.get(stock_id).cloned()
    }
}

#[async_trait]
impl BookCache for MemoryBookCache {
    async fn save_entries(
        &self,
        stock_id: &str,
        side: OrderSide,
        entries: &[BookEntry],
    ) -> Result<(), TradingError> {
        self.entries
            .lock()
            .await
            .insert((stock_id.to_string(), side), entries.to_vec());
        Ok(())
    }

    async fn load_entries(
        &self,
        stock_id: &str,
        side: OrderSide,
    ) -> Result<Vec<BookEntry>, TradingError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(stock_id.to_string(), side))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_snapshot(
        &self,
        stock_id: &str,
        snapshot: &OrderBookSnapshot,
    ) -> Result<(), TradingError> {
        self.snapshots
            .lock()
            .await
            .insert(stock_id.to_string(), snapshot.clone());
        Ok(())
    }
}

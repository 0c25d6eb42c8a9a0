//! One authoritative order book per stock, shared safely across concurrent
//! callers and process instances. Every operation runs inside the
//! per-instrument critical section, and the cache is rewritten before the
//! lock is released, so cache readers always observe the state left by a
//! completed mutation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::BookCache;
use crate::error::TradingError;
use crate::lock::InstrumentLock;
use crate::orderbook::{BookEntry, OrderBook, OrderBookSnapshot};
use crate::persistence::OrderStore;
use crate::types::order::{OrderId, OrderKind, OrderSide};
use crate::types::trade::MatchResult;

pub struct OrderBookRegistry {
    books: Mutex<HashMap<String, Arc<Mutex<OrderBook>>>>,
    cache: Arc<dyn BookCache>,
    orders: Arc<dyn OrderStore>,
    lock: Arc<dyn InstrumentLock>,
}

impl OrderBookRegistry {
    pub fn new(
        cache: Arc<dyn BookCache>,
        orders: Arc<dyn OrderStore>,
        lock: Arc<dyn InstrumentLock>,
    ) -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            cache,
            orders,
            lock,
        }
    }

    /// Match an incoming order against the stock's book. Lock acquisition
    /// failure aborts before any mutation; afterwards the updated book is
    /// persisted to cache before the lock is released.
    pub async fn place_order(
        &self,
        stock_id: &str,
        entry: BookEntry,
        side: OrderSide,
        kind: OrderKind,
    ) -> Result<Vec<MatchResult>, TradingError> {
        let incoming = entry.order_id;
        let lease = self.lock.acquire(stock_id).await?;
        let result = async {
            let book = self.book_for(stock_id, &[incoming]).await;
            let mut book = book.lock().await;
            let matches = book.add_order(entry, side, kind);
            self.write_cache(&book).await;
            Ok(matches)
        }
        .await;
        lease.release().await;
        result
    }

    /// Remove a resting order. Returns false when the book no longer holds
    /// it (already filled or cancelled).
    pub async fn cancel_order(
        &self,
        stock_id: &str,
        order_id: OrderId,
    ) -> Result<bool, TradingError> {
        let lease = self.lock.acquire(stock_id).await?;
        let result = async {
            let book = self.book_for(stock_id, &[]).await;
            let mut book = book.lock().await;
            let cancelled = book.cancel(order_id);
            if cancelled {
                self.write_cache(&book).await;
            }
            Ok(cancelled)
        }
        .await;
        lease.release().await;
        result
    }

    pub async fn snapshot(
        &self,
        stock_id: &str,
        depth: usize,
    ) -> Result<OrderBookSnapshot, TradingError> {
        let lease = self.lock.acquire(stock_id).await?;
        let result = async {
            let book = self.book_for(stock_id, &[]).await;
            let book = book.lock().await;
            Ok(book.snapshot(depth))
        }
        .await;
        lease.release().await;
        result
    }

    /// Bulk-insert pre-built sell entries without matching. Only used at
    /// listing time, when the book is empty by construction and nothing
    /// can cross.
    pub async fn seed_ipo_orders(
        &self,
        stock_id: &str,
        entries: Vec<BookEntry>,
    ) -> Result<(), TradingError> {
        let seeded: Vec<OrderId> = entries.iter().map(|e| e.order_id).collect();
        let lease = self.lock.acquire(stock_id).await?;
        let result = async {
            let book = self.book_for(stock_id, &seeded).await;
            let mut book = book.lock().await;
            book.restore(entries, OrderSide::Sell);
            self.write_cache(&book).await;
            Ok(())
        }
        .await;
        lease.release().await;
        result
    }

    /// Rewrite the cache from the current in-memory book.
    pub async fn persist_to_cache(&self, stock_id: &str) -> Result<(), TradingError> {
        let lease = self.lock.acquire(stock_id).await?;
        let result = async {
            let book = self.book_for(stock_id, &[]).await;
            let book = book.lock().await;
            self.write_cache(&book).await;
            Ok(())
        }
        .await;
        lease.release().await;
        result
    }

    /// Get or lazily create the book. First access reconstructs from the
    /// cache, then from open orders in the durable store; both failing (or
    /// empty) just means a fresh book -- a newly listed stock has no book
    /// yet. `in_flight` names order ids the caller is about to insert
    /// itself; they are already persisted but must not be restored here or
    /// they would enter the book twice. Callers must hold the instrument
    /// lock.
    async fn book_for(&self, stock_id: &str, in_flight: &[OrderId]) -> Arc<Mutex<OrderBook>> {
        {
            let books = self.books.lock().await;
            if let Some(book) = books.get(stock_id) {
                return book.clone();
            }
        }

        let mut book = OrderBook::new(stock_id);
        let restored_from_cache = self.restore_from_cache(&mut book, stock_id).await;
        if !restored_from_cache {
            self.restore_from_store(&mut book, stock_id, in_flight).await;
        }

        let book = Arc::new(Mutex::new(book));
        let mut books = self.books.lock().await;
        books
            .entry(stock_id.to_string())
            .or_insert(book)
            .clone()
    }

    async fn restore_from_cache(&self, book: &mut OrderBook, stock_id: &str) -> bool {
        let bids = self.cache.load_entries(stock_id, OrderSide::Buy).await;
        let asks = self.cache.load_entries(stock_id, OrderSide::Sell).await;
        match (bids, asks) {
            (Ok(bids), Ok(asks)) => {
                if bids.is_empty() && asks.is_empty() {
                    return false;
                }
                info!(
                    stock_id,
                    bids = bids.len(),
                    asks = asks.len(),
                    "order book restored from cache"
                );
                book.restore(bids, OrderSide::Buy);
                book.restore(asks, OrderSide::Sell);
                true
            }
            (bids, asks) => {
                let err = bids.err().or(asks.err());
                warn!(stock_id, ?err, "cache restore failed, trying the store");
                false
            }
        }
    }

    async fn restore_from_store(
        &self,
        book: &mut OrderBook,
        stock_id: &str,
        in_flight: &[OrderId],
    ) {
        let open = match self.orders.find_open_by_stock(stock_id).await {
            Ok(open) => open,
            Err(err) => {
                warn!(stock_id, %err, "store restore failed, starting from an empty book");
                return;
            }
        };
        if open.is_empty() {
            return;
        }

        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for order in open {
            if in_flight.contains(&order.id) {
                continue;
            }
            // Market orders never rest, so every open order here is a limit.
            let Some(price) = order.price else { continue };
            let remaining = order.remaining_quantity();
            if remaining <= 0 {
                continue;
            }
            let entry = BookEntry {
                order_id: order.id,
                user_id: order.user_id,
                price,
                remaining_quantity: remaining,
                timestamp: order.created_at,
            };
            match order.side {
                OrderSide::Buy => bids.push(entry),
                OrderSide::Sell => asks.push(entry),
            }
        }
        if bids.is_empty() && asks.is_empty() {
            return;
        }
        info!(
            stock_id,
            bids = bids.len(),
            asks = asks.len(),
            "order book restored from open orders"
        );
        book.restore(bids, OrderSide::Buy);
        book.restore(asks, OrderSide::Sell);

        // Prime the cache so the next restart takes the fast path.
        self.write_cache(book).await;
    }

    /// Cache failures are logged, never propagated: the in-memory book is
    /// already the truth for this instance, and a completed match is never
    /// undone because a downstream write failed.
    async fn write_cache(&self, book: &OrderBook) {
        let stock_id = book.stock_id().to_string();
        let (bids, asks) = book.all_entries();
        if let Err(err) = self
            .cache
            .save_entries(&stock_id, OrderSide::Buy, &bids)
            .await
        {
            warn!(stock_id, %err, "failed to persist bid entries to cache");
        }
        if let Err(err) = self
            .cache
            .save_entries(&stock_id, OrderSide::Sell, &asks)
            .await
        {
            warn!(stock_id, %err, "failed to persist ask entries to cache");
        }
        if let Err(err) = self
            .cache
            .save_snapshot(&stock_id, &book.snapshot(10))
            .await
        {
            warn!(stock_id, %err, "failed to persist book snapshot to cache");
        }
    }
}

//! Pure per-stock matching: price-time priority over two BTreeMap sides,
//! no I/O. Limit remainders rest; market remainders are discarded here and
//! rejected by the caller when nothing filled at all.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orderbook::snapshot::{OrderBookSnapshot, PriceLevel};
use crate::types::order::{OrderId, OrderKind, OrderSide, Price, Qty};
use crate::types::trade::MatchResult;

/// The in-book representation of a resting order. Exists only while
/// unfilled quantity rests in the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    pub order_id: OrderId,
    pub user_id: String,
    pub price: Price,
    pub remaining_quantity: Qty,
    pub timestamp: DateTime<Utc>,
}

impl BookEntry {
    pub fn new(order_id: OrderId, user_id: String, price: Price, quantity: Qty) -> BookEntry {
        BookEntry {
            order_id,
            user_id,
            price,
            remaining_quantity: quantity,
            timestamp: Utc::now(),
        }
    }
}

type Level = VecDeque<BookEntry>;

pub struct OrderBook {
    stock_id: String,
    bids: BTreeMap<Price, Level>,
    asks: BTreeMap<Price, Level>,
    // order id -> (side, resting price), for O(1) cancel
    index: HashMap<OrderId, (OrderSide, Price)>,
}

impl OrderBook {
    pub fn new(stock_id: impl Into<String>) -> Self {
        Self {
            stock_id: stock_id.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn stock_id(&self) -> &str {
        &self.stock_id
    }

    /// Match an incoming order against the opposite side, then rest any
    /// limit remainder. Returns the trades in execution order.
    pub fn add_order(
        &mut self,
        mut entry: BookEntry,
        side: OrderSide,
        kind: OrderKind,
    ) -> Vec<MatchResult> {
        let matches = self.match_incoming(&mut entry, side, kind);

        // Market remainders never rest; the caller rejects on zero fills.
        if kind == OrderKind::Limit && entry.remaining_quantity > 0 {
            self.insert_entry(entry, side);
        }

        matches
    }

    fn match_incoming(
        &mut self,
        entry: &mut BookEntry,
        side: OrderSide,
        kind: OrderKind,
    ) -> Vec<MatchResult> {
        let mut matches = Vec::new();

        while entry.remaining_quantity > 0 {
            let best = match side {
                OrderSide::Buy => self.best_ask(),
                OrderSide::Sell => self.best_bid(),
            };
            let Some(level_price) = best else {
                break; // no opposing liquidity
            };

            if kind == OrderKind::Limit {
                let acceptable = match side {
                    OrderSide::Buy => level_price <= entry.price,
                    OrderSide::Sell => level_price >= entry.price,
                };
                if !acceptable {
                    break;
                }
            }

            let opposite = match side {
                OrderSide::Buy => &mut self.asks,
                OrderSide::Sell => &mut self.bids,
            };
            let Entry::Occupied(mut level) = opposite.entry(level_price) else {
                break; // cannot happen after the best-price probe
            };

            let queue = level.get_mut();
            while entry.remaining_quantity > 0 {
                let Some(resting) = queue.front_mut() else {
                    break;
                };
                let matched = entry.remaining_quantity.min(resting.remaining_quantity);

                // Execution price is the resting side's price, buyer and
                // seller assigned by who was the aggressor.
                let (buy_order_id, sell_order_id, buyer_id, seller_id) = match side {
                    OrderSide::Buy => (
                        entry.order_id,
                        resting.order_id,
                        entry.user_id.clone(),
                        resting.user_id.clone(),
                    ),
                    OrderSide::Sell => (
                        resting.order_id,
                        entry.order_id,
                        resting.user_id.clone(),
                        entry.user_id.clone(),
                    ),
                };
                matches.push(MatchResult {
                    trade_id: Uuid::new_v4(),
                    buy_order_id,
                    sell_order_id,
                    buyer_id,
                    seller_id,
                    stock_id: self.stock_id.clone(),
                    price: level_price,
                    quantity: matched,
                    matched_at: Utc::now(),
                });

                entry.remaining_quantity -= matched;
                resting.remaining_quantity -= matched;

                if resting.remaining_quantity == 0 {
                    let gone = queue.pop_front().map(|e| e.order_id);
                    if let Some(order_id) = gone {
                        self.index.remove(&order_id);
                    }
                }
            }

            if queue.is_empty() {
                level.remove();
            }
        }

        matches
    }

    fn insert_entry(&mut self, entry: BookEntry, side: OrderSide) {
        let book = match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        };
        self.index.insert(entry.order_id, (side, entry.price));
        book.entry(entry.price).or_default().push_back(entry);
    }

    /// Remove a resting order. Returns false when the id is unknown
    /// (already filled or cancelled) -- not an error.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        let Some((side, price)) = self.index.remove(&order_id) else {
            return false;
        };
        let book = match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        };
        if let Entry::Occupied(mut level) = book.entry(price) {
            let queue = level.get_mut();
            queue.retain(|e| e.order_id != order_id);
            if queue.is_empty() {
                level.remove();
            }
        }
        true
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&price, level)| aggregate_level(price, level))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(&price, level)| aggregate_level(price, level))
            .collect();

        let best_bid = self.best_bid();
        let best_ask = self.best_ask();
        let spread = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        };

        OrderBookSnapshot {
            stock_id: self.stock_id.clone(),
            bids,
            asks,
            best_bid,
            best_ask,
            spread,
            timestamp: Utc::now(),
        }
    }

    /// Bulk-load previously persisted entries without matching. Assumes the
    /// entries were mutually non-crossing when they were last persisted.
    pub fn restore(&mut self, entries: Vec<BookEntry>, side: OrderSide) {
        for entry in entries {
            self.insert_entry(entry, side);
        }
    }

    /// All resting entries, bids by descending then asks by ascending
    /// price, FIFO within a level. Used for cache persistence.
    pub fn all_entries(&self) -> (Vec<BookEntry>, Vec<BookEntry>) {
        let bids = self
            .bids
            .values()
            .rev()
            .flat_map(|level| level.iter().cloned())
            .collect();
        let asks = self
            .asks
            .values()
            .flat_map(|level| level.iter().cloned())
            .collect();
        (bids, asks)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

fn aggregate_level(price: Price, level: &Level) -> PriceLevel {
    PriceLevel {
        price,
        quantity: level.iter().map(|e| e.remaining_quantity).sum(),
        order_count: level.len(),
    }
}

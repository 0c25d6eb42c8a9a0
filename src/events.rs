//! Typed boundary of the core: inbound commands and facts in, outbound
//! facts over a broadcast channel. Transport (HTTP, message bus) is the
//! surrounding system's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::orderbook::PriceLevel;
use crate::types::order::{InvestorType, OrderId, OrderKind, OrderSide, Price, Qty};
use crate::types::trade::Trade;

/// Request to buy or sell. `price` must be Some for Limit and None for
/// Market; the command handler rejects anything else before touching state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub user_id: String,
    pub stock_id: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub price: Option<Price>,
    pub quantity: Qty,
    pub investor_type: InvestorType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub user_id: String,
}

/// A new listing, as delivered by the listing subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockListed {
    pub stock_id: String,
    pub stock_name: String,
    pub base_price: Price,
    pub total_shares: Qty,
}

/// Facts the core publishes after completed mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TradingEvent {
    OrderMatched {
        trade_id: uuid::Uuid,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buyer_id: String,
        seller_id: String,
        stock_id: String,
        price: Price,
        quantity: Qty,
        matched_at: DateTime<Utc>,
    },
    OrderBookChanged {
        stock_id: String,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        best_bid: Option<Price>,
        best_ask: Option<Price>,
        spread: Option<Price>,
    },
    OrderCancelled {
        order_id: OrderId,
        user_id: String,
        stock_id: String,
        reason: String,
    },
}

impl TradingEvent {
    pub fn order_matched(trade: &Trade) -> TradingEvent {
        TradingEvent::OrderMatched {
            trade_id: trade.id,
            buy_order_id: trade.buy_order_id,
            sell_order_id: trade.sell_order_id,
            buyer_id: trade.buyer_id.clone(),
            seller_id: trade.seller_id.clone(),
            stock_id: trade.stock_id.clone(),
            price: trade.price,
            quantity: trade.quantity,
            matched_at: trade.traded_at,
        }
    }

    pub fn book_changed(snapshot: &crate::orderbook::OrderBookSnapshot) -> TradingEvent {
        TradingEvent::OrderBookChanged {
            stock_id: snapshot.stock_id.clone(),
            bids: snapshot.bids.clone(),
            asks: snapshot.asks.clone(),
            best_bid: snapshot.best_bid,
            best_ask: snapshot.best_ask,
            spread: snapshot.spread,
        }
    }
}

/// Fan-out for outbound facts. Publishing with no subscribers is normal
/// (nobody is listening yet), and a completed match is never undone because
/// a consumer is missing.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TradingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> EventBus {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradingEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: TradingEvent) {
        if self.tx.send(event).is_err() {
            debug!("event published with no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(256)
    }
}

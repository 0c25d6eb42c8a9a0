use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::order::{InvestorType, OrderId, Price, Qty};

pub type TradeId = Uuid;

/// One crossing between a resting entry and an incoming order. The price is
/// always the resting side's price. Immutable once created; persisted as an
/// append-only record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub buyer_type: InvestorType,
    pub seller_id: String,
    pub seller_type: InvestorType,
    pub stock_id: String,
    pub price: Price,
    pub quantity: Qty,
    pub traded_at: DateTime<Utc>,
}

impl Trade {
    pub fn amount(&self) -> i64 {
        self.price * self.quantity
    }
}

/// Match output of the book before investor types are resolved. The book
/// only knows order and user ids; the command handler fills in the types
/// when it turns these into `Trade` records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub trade_id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub stock_id: String,
    pub price: Price,
    pub quantity: Qty,
    pub matched_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn into_trade(self, buyer_type: InvestorType, seller_type: InvestorType) -> Trade {
        Trade {
            id: self.trade_id,
            buy_order_id: self.buy_order_id,
            sell_order_id: self.sell_order_id,
            buyer_id: self.buyer_id,
            buyer_type,
            seller_id: self.seller_id,
            seller_type,
            stock_id: self.stock_id,
            price: self.price,
            quantity: self.quantity,
            traded_at: self.matched_at,
        }
    }
}

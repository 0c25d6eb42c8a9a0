use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::order::{Price, Qty};

/// Aggregate of all resting orders at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Qty,
    pub order_count: usize,
}

/// Read-only projection of a book: top-N levels per side plus best prices.
/// Computed on demand; never a source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub stock_id: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Price>,
    pub timestamp: DateTime<Utc>,
}

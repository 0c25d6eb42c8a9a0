//! IPO seeding: on a new listing, give the market maker the whole float
//! and seed the book with a ladder of sell orders so the instrument has
//! liquidity from its first trade.

use std::sync::Arc;

use tracing::info;

use crate::error::TradingError;
use crate::events::{EventBus, StockListed, TradingEvent};
use crate::orderbook::BookEntry;
use crate::persistence::{HoldingStore, OrderStore};
use crate::pricing;
use crate::registry::OrderBookRegistry;
use crate::types::order::{InvestorType, Order, OrderSide, Price, Qty};
use crate::types::portfolio::Holding;

/// System identity that holds the float and sells it into the market.
pub const MARKET_MAKER_ID: &str = "SYSTEM_IPO";

pub struct IpoSeedingHandler {
    orders: Arc<dyn OrderStore>,
    holdings: Arc<dyn HoldingStore>,
    registry: Arc<OrderBookRegistry>,
    events: EventBus,
    price_levels: usize,
    spread_bps: i64,
    orders_per_level: usize,
    snapshot_depth: usize,
}

impl IpoSeedingHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        holdings: Arc<dyn HoldingStore>,
        registry: Arc<OrderBookRegistry>,
        events: EventBus,
        price_levels: usize,
        spread_bps: i64,
        orders_per_level: usize,
        snapshot_depth: usize,
    ) -> Self {
        Self {
            orders,
            holdings,
            registry,
            events,
            price_levels,
            spread_bps,
            orders_per_level,
            snapshot_depth,
        }
    }

    /// Seeding runs before the instrument is discoverable for trading, so
    /// the book is empty by construction and the seeded asks cannot cross
    /// anything.
    pub async fn on_stock_listed(&self, event: StockListed) -> Result<(), TradingError> {
        info!(
            stock_id = %event.stock_id,
            stock_name = %event.stock_name,
            base_price = event.base_price,
            total_shares = event.total_shares,
            "seeding IPO order book"
        );

        if event.base_price <= 0 || event.total_shares <= 0 {
            return Err(TradingError::Validation(format!(
                "listing needs positive base price and share count, got {} / {}",
                event.base_price, event.total_shares
            )));
        }

        // The market maker starts with 100% of the issued shares.
        let holding = Holding::with_quantity(
            MARKET_MAKER_ID.to_string(),
            InvestorType::MarketMaker,
            event.stock_id.clone(),
            event.total_shares,
            event.base_price,
        );
        self.holdings.upsert(&holding).await?;

        let ladder = build_ladder(
            event.base_price,
            event.total_shares,
            self.price_levels,
            self.spread_bps,
        );

        let mut orders = Vec::new();
        let mut entries = Vec::new();
        for (price, level_shares) in ladder {
            for shares in split_level(level_shares, self.orders_per_level) {
                let order = Order::new_limit(
                    MARKET_MAKER_ID.to_string(),
                    event.stock_id.clone(),
                    OrderSide::Sell,
                    price,
                    shares,
                    InvestorType::MarketMaker,
                )?;
                entries.push(BookEntry::new(
                    order.id,
                    order.user_id.clone(),
                    price,
                    shares,
                ));
                orders.push(order);
            }
        }

        self.orders.insert_all(&orders).await?;
        // Bypasses the match loop; also persists the book to cache.
        self.registry
            .seed_ipo_orders(&event.stock_id, entries)
            .await?;

        let snapshot = self
            .registry
            .snapshot(&event.stock_id, self.snapshot_depth)
            .await?;
        self.events.publish(TradingEvent::book_changed(&snapshot));

        info!(
            stock_id = %event.stock_id,
            sell_orders = orders.len(),
            "IPO order book seeded"
        );
        Ok(())
    }
}

/// Price ladder from base to base * (1 + spread), evenly spaced and then
/// adjusted up to valid ticks (colliding levels merge). Lower levels carry
/// more shares: level i of n weighs n - i, and the integer-division
/// remainder goes to the first level so the ladder sums to `total_shares`
/// exactly.
fn build_ladder(
    base_price: Price,
    total_shares: Qty,
    levels: usize,
    spread_bps: i64,
) -> Vec<(Price, Qty)> {
    let levels = levels.max(1);
    let span = base_price * spread_bps / 10_000;

    let mut prices = Vec::with_capacity(levels);
    for i in 0..levels {
        let raw = if levels == 1 {
            base_price
        } else {
            base_price + span * i as i64 / (levels as i64 - 1)
        };
        prices.push(pricing::adjust_up(raw));
    }

    let total_weight: i64 = (1..=levels as i64).sum();
    let mut allocations: Vec<Qty> = (0..levels)
        .map(|i| {
            let weight = (levels - i) as i64;
            total_shares * weight / total_weight
        })
        .collect();
    let allocated: Qty = allocations.iter().sum();
    allocations[0] += total_shares - allocated;

    // Tick adjustment can collapse neighbouring raw prices onto the same
    // tick; merge those (prices are non-decreasing, so duplicates are
    // adjacent).
    let mut ladder: Vec<(Price, Qty)> = Vec::with_capacity(levels);
    for (price, shares) in prices.into_iter().zip(allocations) {
        if shares <= 0 {
            continue;
        }
        match ladder.last_mut() {
            Some((last_price, last_shares)) if *last_price == price => *last_shares += shares,
            _ => ladder.push((price, shares)),
        }
    }
    ladder
}

/// Split one level's allocation into several orders so the book does not
/// show a single giant order; remainder shares go to the first orders.
fn split_level(level_shares: Qty, orders_per_level: usize) -> Vec<Qty> {
    let n = orders_per_level.max(1) as i64;
    let per_order = level_shares / n;
    let remainder = level_shares % n;
    (0..n)
        .map(|i| per_order + if i < remainder { 1 } else { 0 })
        .filter(|&shares| shares > 0)
        .collect()
}

//! The transactional boundary for placing and cancelling orders.
//!
//! Everything before the book mutation can abort with no side effects.
//! Once the book has matched shares, that is immutable fact: later
//! bookkeeping failures are logged and surfaced but never roll the match
//! back.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::TradingError;
use crate::events::{CancelOrder, EventBus, PlaceOrder, TradingEvent};
use crate::orderbook::BookEntry;
use crate::persistence::{BalanceStore, HoldingStore, OrderStore};
use crate::pricing;
use crate::registry::OrderBookRegistry;
use crate::types::order::{InvestorType, Order, OrderId, OrderKind, OrderSide, Qty};
use crate::types::trade::{MatchResult, Trade};

use super::settlement::SettlementHandler;

#[derive(Debug)]
pub struct PlaceOrderOutcome {
    pub order: Order,
    pub trades: Vec<Trade>,
}

pub struct OrderCommandHandler {
    orders: Arc<dyn OrderStore>,
    holdings: Arc<dyn HoldingStore>,
    balances: Arc<dyn BalanceStore>,
    registry: Arc<OrderBookRegistry>,
    settlement: Arc<SettlementHandler>,
    events: EventBus,
    snapshot_depth: usize,
}

impl OrderCommandHandler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        holdings: Arc<dyn HoldingStore>,
        balances: Arc<dyn BalanceStore>,
        registry: Arc<OrderBookRegistry>,
        settlement: Arc<SettlementHandler>,
        events: EventBus,
        snapshot_depth: usize,
    ) -> Self {
        Self {
            orders,
            holdings,
            balances,
            registry,
            settlement,
            events,
            snapshot_depth,
        }
    }

    pub async fn place_order(
        &self,
        command: PlaceOrder,
    ) -> Result<PlaceOrderOutcome, TradingError> {
        // 1. Shape and tick validation, before any state changes.
        let order = self.validate_and_create(&command)?;

        // 2. Pre-trade sufficiency for everyone but system identities.
        if !command.investor_type.is_system() {
            self.check_sufficiency(&command).await?;
        }

        // 3. Persist the pending order, then run the match.
        self.orders.insert(&order).await?;
        let entry = BookEntry::new(
            order.id,
            order.user_id.clone(),
            order.price.unwrap_or(0),
            order.quantity,
        );
        let matches = self
            .registry
            .place_order(&command.stock_id, entry, command.side, command.kind)
            .await?;

        // 4. The book has spoken; from here on nothing is rolled back.
        let mut order = order;
        let total_filled: Qty = matches.iter().map(|m| m.quantity).sum();
        let mut trades = Vec::new();

        if total_filled > 0 {
            order.fill(total_filled)?;
            if let Err(err) = self.orders.update(&order).await {
                warn!(order_id = %order.id, %err, "failed to persist fill on the incoming order");
            }
            self.apply_counterparty_fills(&matches, order.id).await;
            trades = self.resolve_trades(matches, &order).await;
            self.settlement.settle(&trades).await?;
        } else if command.kind == OrderKind::Market {
            // 5. A market order with no opposing liquidity never rests.
            order.reject();
            self.orders.update(&order).await?;
            info!(order_id = %order.id, "market order rejected, no liquidity");
        }

        // 6. Publish facts; the registry already persisted the book.
        for trade in &trades {
            self.events.publish(TradingEvent::order_matched(trade));
        }
        self.publish_book_changed(&command.stock_id).await;

        info!(
            order_id = %order.id,
            status = ?order.status,
            trades = trades.len(),
            "order placed"
        );
        Ok(PlaceOrderOutcome { order, trades })
    }

    pub async fn cancel_order(&self, command: CancelOrder) -> Result<Order, TradingError> {
        let mut order = self
            .orders
            .find_by_id(command.order_id)
            .await?
            .ok_or(TradingError::OrderNotFound(command.order_id))?;

        if order.user_id != command.user_id {
            return Err(TradingError::Forbidden {
                order_id: order.id,
                user_id: command.user_id,
            });
        }
        if order.status.is_terminal() {
            return Err(TradingError::InvalidOrderState {
                order_id: order.id,
                status: order.status,
            });
        }

        self.registry
            .cancel_order(&order.stock_id, order.id)
            .await?;
        order.cancel()?;
        self.orders.update(&order).await?;

        self.events.publish(TradingEvent::OrderCancelled {
            order_id: order.id,
            user_id: order.user_id.clone(),
            stock_id: order.stock_id.clone(),
            reason: "cancelled by owner".to_string(),
        });
        self.publish_book_changed(&order.stock_id).await;

        info!(order_id = %order.id, "order cancelled");
        Ok(order)
    }

    fn validate_and_create(&self, command: &PlaceOrder) -> Result<Order, TradingError> {
        match (command.kind, command.price) {
            (OrderKind::Limit, Some(price)) => {
                if !pricing::is_valid_tick(price) {
                    return Err(TradingError::InvalidTick {
                        price,
                        tick_size: pricing::tick_size(price),
                    });
                }
                Order::new_limit(
                    command.user_id.clone(),
                    command.stock_id.clone(),
                    command.side,
                    price,
                    command.quantity,
                    command.investor_type,
                )
            }
            (OrderKind::Limit, None) => Err(TradingError::Validation(
                "limit order requires a price".to_string(),
            )),
            (OrderKind::Market, None) => Order::new_market(
                command.user_id.clone(),
                command.stock_id.clone(),
                command.side,
                command.quantity,
                command.investor_type,
            ),
            (OrderKind::Market, Some(_)) => Err(TradingError::Validation(
                "market order must not carry a price".to_string(),
            )),
        }
    }

    async fn check_sufficiency(&self, command: &PlaceOrder) -> Result<(), TradingError> {
        match command.side {
            OrderSide::Buy => {
                let balance = self
                    .balances
                    .find(&command.user_id, command.investor_type)
                    .await?;
                let available = balance.map(|b| b.cash).unwrap_or(0);
                if available <= 0 {
                    return Err(TradingError::InsufficientBalance {
                        required: 0,
                        available,
                    });
                }
                // A limit buy knows its exact worst case; a market buy is
                // only gated on having any cash at all.
                if let Some(price) = command.price {
                    let required = price * command.quantity;
                    if available < required {
                        return Err(TradingError::InsufficientBalance {
                            required,
                            available,
                        });
                    }
                }
            }
            OrderSide::Sell => {
                let holding = self
                    .holdings
                    .find(&command.user_id, command.investor_type, &command.stock_id)
                    .await?;
                let available = holding.map(|h| h.quantity).unwrap_or(0);
                if available < command.quantity {
                    return Err(TradingError::InsufficientHoldings {
                        required: command.quantity,
                        available,
                    });
                }
            }
        }
        Ok(())
    }

    /// Advance filled quantity on every counterparty order touched by this
    /// call, aggregated per order id across all trades. The match already
    /// happened, so store failures on individual counterparties are logged
    /// and the remaining bookkeeping goes on.
    async fn apply_counterparty_fills(&self, matches: &[MatchResult], incoming_id: OrderId) {
        let mut filled_by_order: HashMap<OrderId, Qty> = HashMap::new();
        for m in matches {
            for order_id in [m.buy_order_id, m.sell_order_id] {
                if order_id != incoming_id {
                    *filled_by_order.entry(order_id).or_default() += m.quantity;
                }
            }
        }

        for (order_id, quantity) in filled_by_order {
            let mut counterparty = match self.orders.find_by_id(order_id).await {
                Ok(Some(counterparty)) => counterparty,
                Ok(None) => {
                    warn!(%order_id, "matched counterparty order missing from store");
                    continue;
                }
                Err(err) => {
                    warn!(%order_id, %err, "failed to load matched counterparty order");
                    continue;
                }
            };
            if counterparty.status.is_terminal() {
                warn!(%order_id, status = ?counterparty.status, "matched counterparty already terminal");
                continue;
            }
            if let Err(err) = counterparty.fill(quantity) {
                warn!(%order_id, %err, "counterparty fill does not reconcile with its order record");
                continue;
            }
            if let Err(err) = self.orders.update(&counterparty).await {
                warn!(%order_id, %err, "failed to persist counterparty fill");
            }
        }
    }

    /// Attach investor types to raw match results. The incoming order
    /// already knows its own type; counterparty types come from their
    /// order records, falling back to User when a record cannot be read,
    /// so matched trades always reach settlement.
    async fn resolve_trades(&self, matches: Vec<MatchResult>, incoming: &Order) -> Vec<Trade> {
        let mut types_by_order: HashMap<OrderId, InvestorType> = HashMap::new();
        types_by_order.insert(incoming.id, incoming.investor_type);

        let mut trades = Vec::with_capacity(matches.len());
        for m in matches {
            let buyer_type = self
                .investor_type_for(&mut types_by_order, m.buy_order_id)
                .await;
            let seller_type = self
                .investor_type_for(&mut types_by_order, m.sell_order_id)
                .await;
            trades.push(m.into_trade(buyer_type, seller_type));
        }
        trades
    }

    async fn investor_type_for(
        &self,
        cache: &mut HashMap<OrderId, InvestorType>,
        order_id: OrderId,
    ) -> InvestorType {
        if let Some(&t) = cache.get(&order_id) {
            return t;
        }
        let t = match self.orders.find_by_id(order_id).await {
            Ok(Some(order)) => order.investor_type,
            Ok(None) => {
                warn!(%order_id, "matched order missing from store, assuming User");
                InvestorType::User
            }
            Err(err) => {
                warn!(%order_id, %err, "failed to load matched order, assuming User");
                InvestorType::User
            }
        };
        cache.insert(order_id, t);
        t
    }

    /// Snapshot publication failing must not fail the command; the match
    /// already happened.
    async fn publish_book_changed(&self, stock_id: &str) {
        match self.registry.snapshot(stock_id, self.snapshot_depth).await {
            Ok(snapshot) => self.events.publish(TradingEvent::book_changed(&snapshot)),
            Err(err) => {
                warn!(stock_id, %err, "failed to snapshot book for event publication");
            }
        }
    }
}

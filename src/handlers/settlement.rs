//! Settlement: turn confirmed trades into durable cash and holding
//! effects. Each trade settles exactly once, keyed by its trade id.
//!
//! Insufficient cash or shares at settlement time are data-quality
//! signals, not crash conditions: the match is already immutable fact, so
//! the affected sub-step is skipped with a warning instead of producing a
//! negative balance or holding.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::TradingError;
use crate::persistence::{BalanceStore, HoldingStore, TradeStore};
use crate::types::order::InvestorType;
use crate::types::portfolio::{Holding, InvestorBalance};
use crate::types::trade::Trade;

pub struct SettlementHandler {
    trades: Arc<dyn TradeStore>,
    holdings: Arc<dyn HoldingStore>,
    balances: Arc<dyn BalanceStore>,
}

impl SettlementHandler {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        holdings: Arc<dyn HoldingStore>,
        balances: Arc<dyn BalanceStore>,
    ) -> Self {
        Self {
            trades,
            holdings,
            balances,
        }
    }

    pub async fn settle(&self, trades: &[Trade]) -> Result<(), TradingError> {
        for trade in trades {
            self.settle_trade(trade).await?;
        }
        Ok(())
    }

    /// Apply one trade to both parties. Re-delivery of an already-settled
    /// trade id is a no-op.
    pub async fn settle_trade(&self, trade: &Trade) -> Result<(), TradingError> {
        if self.trades.find_by_id(trade.id).await?.is_some() {
            debug!(trade_id = %trade.id, "trade already settled, skipping");
            return Ok(());
        }

        self.trades.insert(trade).await?;
        self.settle_buyer(trade).await?;
        self.settle_seller(trade).await?;
        Ok(())
    }

    /// Create a balance row with the given starting capital if the
    /// investor has none yet. Used for synthetic traders; real user
    /// balances are created at signup by another component.
    pub async fn ensure_balance(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
        capital: i64,
    ) -> Result<(), TradingError> {
        if self.balances.find(investor_id, investor_type).await?.is_none() {
            let balance =
                InvestorBalance::new(investor_id.to_string(), investor_type, capital);
            self.balances.upsert(&balance).await?;
            info!(investor_id, ?investor_type, capital, "balance lazily initialized");
        }
        Ok(())
    }

    async fn settle_buyer(&self, trade: &Trade) -> Result<(), TradingError> {
        let amount = trade.amount();

        // Shares always move; they were matched out of the book.
        let mut holding = self
            .holdings
            .find(&trade.buyer_id, trade.buyer_type, &trade.stock_id)
            .await?
            .unwrap_or_else(|| {
                Holding::empty(
                    trade.buyer_id.clone(),
                    trade.buyer_type,
                    trade.stock_id.clone(),
                )
            });
        holding.add(trade.quantity, trade.price);
        self.holdings.upsert(&holding).await?;

        // Cash only moves when it is actually there.
        match self.balances.find(&trade.buyer_id, trade.buyer_type).await? {
            Some(mut balance) if balance.cash >= amount => {
                balance.deduct(amount)?;
                self.balances.upsert(&balance).await?;
            }
            Some(balance) => {
                warn!(
                    trade_id = %trade.id,
                    buyer_id = %trade.buyer_id,
                    required = amount,
                    available = balance.cash,
                    "insufficient cash, skipping buyer debit"
                );
            }
            None => {
                warn!(
                    trade_id = %trade.id,
                    buyer_id = %trade.buyer_id,
                    required = amount,
                    "no balance row, skipping buyer debit"
                );
            }
        }
        Ok(())
    }

    async fn settle_seller(&self, trade: &Trade) -> Result<(), TradingError> {
        let amount = trade.amount();

        match self
            .holdings
            .find(&trade.seller_id, trade.seller_type, &trade.stock_id)
            .await?
        {
            Some(mut holding) if holding.quantity >= trade.quantity => {
                holding.remove(trade.quantity)?;
                self.holdings.upsert(&holding).await?;
            }
            holding => {
                warn!(
                    trade_id = %trade.id,
                    seller_id = %trade.seller_id,
                    required = trade.quantity,
                    available = holding.map(|h| h.quantity).unwrap_or(0),
                    "insufficient holdings, skipping seller decrement"
                );
            }
        }

        match self.balances.find(&trade.seller_id, trade.seller_type).await? {
            Some(mut balance) => {
                balance.credit(amount);
                self.balances.upsert(&balance).await?;
            }
            None => {
                warn!(
                    trade_id = %trade.id,
                    seller_id = %trade.seller_id,
                    "no balance row, skipping seller credit"
                );
            }
        }
        Ok(())
    }
}

//! Read-side queries over the book, portfolios, balances and trade history.

use std::sync::Arc;

use crate::error::TradingError;
use crate::orderbook::OrderBookSnapshot;
use crate::persistence::{BalanceStore, HoldingStore, TradeStore};
use crate::registry::OrderBookRegistry;
use crate::types::order::InvestorType;
use crate::types::portfolio::{Holding, InvestorBalance};
use crate::types::trade::Trade;

pub struct QueryHandler {
    registry: Arc<OrderBookRegistry>,
    holdings: Arc<dyn HoldingStore>,
    balances: Arc<dyn BalanceStore>,
    trades: Arc<dyn TradeStore>,
}

impl QueryHandler {
    pub fn new(
        registry: Arc<OrderBookRegistry>,
        holdings: Arc<dyn HoldingStore>,
        balances: Arc<dyn BalanceStore>,
        trades: Arc<dyn TradeStore>,
    ) -> Self {
        Self {
            registry,
            holdings,
            balances,
            trades,
        }
    }

    pub async fn order_book(
        &self,
        stock_id: &str,
        depth: usize,
    ) -> Result<OrderBookSnapshot, TradingError> {
        self.registry.snapshot(stock_id, depth).await
    }

    /// Positions that were fully sold off stay in storage with quantity
    /// zero; the portfolio view hides them.
    pub async fn portfolio(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Vec<Holding>, TradingError> {
        let holdings = self
            .holdings
            .find_for_investor(investor_id, investor_type)
            .await?;
        Ok(holdings.into_iter().filter(|h| h.quantity > 0).collect())
    }

    pub async fn balance(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Option<InvestorBalance>, TradingError> {
        self.balances.find(investor_id, investor_type).await
    }

    pub async fn trade_history(
        &self,
        investor_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError> {
        self.trades.find_by_investor(investor_id, limit).await
    }

    pub async fn stock_trades(
        &self,
        stock_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError> {
        self.trades.find_by_stock(stock_id, limit).await
    }
}

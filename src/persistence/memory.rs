//! In-memory store implementations. Same contracts as the Postgres stores;
//! used by the integration tests and by single-process deployments that
//! run without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BalanceStore, HoldingStore, OrderStore, TradeStore};
use crate::error::TradingError;
use crate::types::order::{InvestorType, Order, OrderId, OrderKind};
use crate::types::portfolio::{Holding, InvestorBalance};
use crate::types::trade::{Trade, TradeId};

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<OrderId, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), TradingError> {
        self.orders.lock().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_all(&self, orders: &[Order]) -> Result<(), TradingError> {
        let mut guard = self.orders.lock().await;
        for order in orders {
            guard.insert(order.id, order.clone());
        }
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), TradingError> {
        self.orders.lock().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, TradingError> {
        Ok(self.orders.lock().await.get(&order_id).cloned())
    }

    async fn find_open_by_stock(&self, stock_id: &str) -> Result<Vec<Order>, TradingError> {
        let guard = self.orders.lock().await;
        let mut open: Vec<Order> = guard
            .values()
            .filter(|o| {
                o.stock_id == stock_id && o.kind == OrderKind::Limit && !o.status.is_terminal()
            })
            .cloned()
            .collect();
        open.sort_by_key(|o| o.created_at);
        Ok(open)
    }
}

#[derive(Default)]
pub struct MemoryTradeStore {
    trades: Mutex<Vec<Trade>>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.trades.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.trades.lock().await.is_empty()
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn insert(&self, trade: &Trade) -> Result<(), TradingError> {
        self.trades.lock().await.push(trade.clone());
        Ok(())
    }

    async fn find_by_id(&self, trade_id: TradeId) -> Result<Option<Trade>, TradingError> {
        Ok(self
            .trades
            .lock()
            .await
            .iter()
            .find(|t| t.id == trade_id)
            .cloned())
    }

    async fn find_by_investor(
        &self,
        investor_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError> {
        let guard = self.trades.lock().await;
        Ok(guard
            .iter()
            .rev()
            .filter(|t| t.buyer_id == investor_id || t.seller_id == investor_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_stock(
        &self,
        stock_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError> {
        let guard = self.trades.lock().await;
        Ok(guard
            .iter()
            .rev()
            .filter(|t| t.stock_id == stock_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

type HoldingKey = (String, InvestorType, String);

#[derive(Default)]
pub struct MemoryHoldingStore {
    holdings: Mutex<HashMap<HoldingKey, Holding>>,
}

impl MemoryHoldingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldingStore for MemoryHoldingStore {
    async fn find(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
        stock_id: &str,
    ) -> Result<Option<Holding>, TradingError> {
        let key = (
            investor_id.to_string(),
            investor_type,
            stock_id.to_string(),
        );
        Ok(self.holdings.lock().await.get(&key).cloned())
    }

    async fn upsert(&self, holding: &Holding) -> Result<(), TradingError> {
        let key = (
            holding.investor_id.clone(),
            holding.investor_type,
            holding.stock_id.clone(),
        );
        self.holdings.lock().await.insert(key, holding.clone());
        Ok(())
    }

    async fn find_for_investor(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Vec<Holding>, TradingError> {
        let guard = self.holdings.lock().await;
        let mut holdings: Vec<Holding> = guard
            .values()
            .filter(|h| h.investor_id == investor_id && h.investor_type == investor_type)
            .cloned()
            .collect();
        holdings.sort_by(|a, b| a.stock_id.cmp(&b.stock_id));
        Ok(holdings)
    }
}

#[derive(Default)]
pub struct MemoryBalanceStore {
    balances: Mutex<HashMap<(String, InvestorType), InvestorBalance>>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn find(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Option<InvestorBalance>, TradingError> {
        let key = (investor_id.to_string(), investor_type);
        Ok(self.balances.lock().await.get(&key).cloned())
    }

    async fn upsert(&self, balance: &InvestorBalance) -> Result<(), TradingError> {
        let key = (balance.investor_id.clone(), balance.investor_type);
        self.balances.lock().await.insert(key, balance.clone());
        Ok(())
    }
}

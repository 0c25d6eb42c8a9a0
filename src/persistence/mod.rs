//! Storage ports and their Postgres / in-memory implementations. The
//! handlers only see the traits; the Postgres impls follow the runtime
//! `sqlx::query` style throughout, and the memory impls back tests and
//! single-process deployments.

mod balances;
mod memory;
mod orders;
mod pool;
mod portfolios;
mod trades;

use async_trait::async_trait;

use crate::error::TradingError;
use crate::types::order::{InvestorType, Order, OrderId};
use crate::types::portfolio::{Holding, InvestorBalance};
use crate::types::trade::{Trade, TradeId};

pub use balances::PgBalanceStore;
pub use memory::{MemoryBalanceStore, MemoryHoldingStore, MemoryOrderStore, MemoryTradeStore};
pub use orders::PgOrderStore;
pub use pool::create_pool_and_migrate;
pub use portfolios::PgHoldingStore;
pub use sqlx::PgPool;
pub use trades::PgTradeStore;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), TradingError>;
    async fn insert_all(&self, orders: &[Order]) -> Result<(), TradingError>;
    async fn update(&self, order: &Order) -> Result<(), TradingError>;
    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, TradingError>;
    /// Open (Pending or PartiallyFilled) limit orders for a stock, oldest
    /// first. Market orders never rest, so a partially filled one is not
    /// "open" in any book-rebuilding sense. Used to rebuild a book when
    /// both the process and the cache are gone.
    async fn find_open_by_stock(&self, stock_id: &str) -> Result<Vec<Order>, TradingError>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert(&self, trade: &Trade) -> Result<(), TradingError>;
    async fn find_by_id(&self, trade_id: TradeId) -> Result<Option<Trade>, TradingError>;
    async fn find_by_investor(
        &self,
        investor_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError>;
    async fn find_by_stock(&self, stock_id: &str, limit: usize)
    -> Result<Vec<Trade>, TradingError>;
}

#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn find(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
        stock_id: &str,
    ) -> Result<Option<Holding>, TradingError>;
    async fn upsert(&self, holding: &Holding) -> Result<(), TradingError>;
    async fn find_for_investor(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Vec<Holding>, TradingError>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn find(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Option<InvestorBalance>, TradingError>;
    async fn upsert(&self, balance: &InvestorBalance) -> Result<(), TradingError>;
}

// Enum <-> text mapping shared by the Postgres stores.

pub(crate) fn investor_type_to_str(t: InvestorType) -> &'static str {
    match t {
        InvestorType::User => "User",
        InvestorType::Institution => "Institution",
        InvestorType::Npc => "Npc",
        InvestorType::MarketMaker => "MarketMaker",
    }
}

pub(crate) fn str_to_investor_type(s: &str) -> Option<InvestorType> {
    match s {
        "User" => Some(InvestorType::User),
        "Institution" => Some(InvestorType::Institution),
        "Npc" => Some(InvestorType::Npc),
        "MarketMaker" => Some(InvestorType::MarketMaker),
        _ => None,
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TradingError;

pub type Price = i64;
pub type Qty = i64;
pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrderKind {
    #[default]
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal orders can never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// Who is trading: real users sign up elsewhere; the rest are synthetic
/// identities owned by the platform. MarketMaker is exempt from pre-trade
/// sufficiency checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvestorType {
    User,
    Institution,
    Npc,
    MarketMaker,
}

impl InvestorType {
    pub fn is_system(self) -> bool {
        matches!(self, InvestorType::MarketMaker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    pub stock_id: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Present iff kind == Limit.
    pub price: Option<Price>,
    pub quantity: Qty,
    pub filled_quantity: Qty,
    pub status: OrderStatus,
    pub investor_type: InvestorType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new_limit(
        user_id: String,
        stock_id: String,
        side: OrderSide,
        price: Price,
        quantity: Qty,
        investor_type: InvestorType,
    ) -> Result<Order, TradingError> {
        if price <= 0 {
            return Err(TradingError::Validation(format!(
                "limit price must be positive, got {price}"
            )));
        }
        Self::new(
            user_id,
            stock_id,
            side,
            OrderKind::Limit,
            Some(price),
            quantity,
            investor_type,
        )
    }

    pub fn new_market(
        user_id: String,
        stock_id: String,
        side: OrderSide,
        quantity: Qty,
        investor_type: InvestorType,
    ) -> Result<Order, TradingError> {
        Self::new(
            user_id,
            stock_id,
            side,
            OrderKind::Market,
            None,
            quantity,
            investor_type,
        )
    }

    fn new(
        user_id: String,
        stock_id: String,
        side: OrderSide,
        kind: OrderKind,
        price: Option<Price>,
        quantity: Qty,
        investor_type: InvestorType,
    ) -> Result<Order, TradingError> {
        if quantity <= 0 {
            return Err(TradingError::Validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        let now = Utc::now();
        Ok(Order {
            id: Uuid::new_v4(),
            user_id,
            stock_id,
            side,
            kind,
            price,
            quantity,
            filled_quantity: 0,
            status: OrderStatus::Pending,
            investor_type,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn remaining_quantity(&self) -> Qty {
        self.quantity - self.filled_quantity
    }

    /// Advance the fill counter; moves to Filled when nothing remains.
    pub fn fill(&mut self, matched: Qty) -> Result<(), TradingError> {
        if matched <= 0 {
            return Err(TradingError::Validation(format!(
                "matched quantity must be positive, got {matched}"
            )));
        }
        if self.filled_quantity + matched > self.quantity {
            return Err(TradingError::Validation(format!(
                "cannot fill {matched} on order {}: {} of {} already filled",
                self.id, self.filled_quantity, self.quantity
            )));
        }
        self.filled_quantity += matched;
        self.status = if self.filled_quantity == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Owner-initiated cancel; only resting orders qualify.
    pub fn cancel(&mut self) -> Result<(), TradingError> {
        if !matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::PartiallyFilled
        ) {
            return Err(TradingError::InvalidOrderState {
                order_id: self.id,
                status: self.status,
            });
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Market order with no opposing liquidity.
    pub fn reject(&mut self) {
        self.status = OrderStatus::Rejected;
        self.updated_at = Utc::now();
    }
}

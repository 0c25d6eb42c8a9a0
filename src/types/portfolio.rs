use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TradingError;
use crate::types::order::{InvestorType, Price, Qty};

/// Holding per (investor, investor type, stock). Quantity never goes
/// negative; average price is the weighted average of what was paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub investor_id: String,
    pub investor_type: InvestorType,
    pub stock_id: String,
    pub quantity: Qty,
    pub average_price: Price,
    pub total_invested: i64,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    pub fn empty(investor_id: String, investor_type: InvestorType, stock_id: String) -> Holding {
        Holding {
            investor_id,
            investor_type,
            stock_id,
            quantity: 0,
            average_price: 0,
            total_invested: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_quantity(
        investor_id: String,
        investor_type: InvestorType,
        stock_id: String,
        quantity: Qty,
        price: Price,
    ) -> Holding {
        Holding {
            investor_id,
            investor_type,
            stock_id,
            quantity,
            average_price: price,
            total_invested: price * quantity,
            updated_at: Utc::now(),
        }
    }

    pub fn add(&mut self, quantity: Qty, price: Price) {
        self.total_invested += price * quantity;
        self.quantity += quantity;
        self.average_price = if self.quantity > 0 {
            self.total_invested / self.quantity
        } else {
            0
        };
        self.updated_at = Utc::now();
    }

    /// Removing keeps the average price of what stays; zeroing the position
    /// zeroes the cost basis.
    pub fn remove(&mut self, quantity: Qty) -> Result<(), TradingError> {
        if quantity > self.quantity {
            return Err(TradingError::InsufficientHoldings {
                required: quantity,
                available: self.quantity,
            });
        }
        self.quantity -= quantity;
        self.total_invested = if self.quantity > 0 {
            self.average_price * self.quantity
        } else {
            0
        };
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Cash per (investor, investor type). Debits are only applied after the
/// balance is confirmed sufficient, so cash cannot go negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorBalance {
    pub investor_id: String,
    pub investor_type: InvestorType,
    pub cash: i64,
    pub updated_at: DateTime<Utc>,
}

impl InvestorBalance {
    pub fn new(investor_id: String, investor_type: InvestorType, cash: i64) -> InvestorBalance {
        InvestorBalance {
            investor_id,
            investor_type,
            cash,
            updated_at: Utc::now(),
        }
    }

    pub fn deduct(&mut self, amount: i64) -> Result<(), TradingError> {
        if amount > self.cash {
            return Err(TradingError::InsufficientBalance {
                required: amount,
                available: self.cash,
            });
        }
        self.cash -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn credit(&mut self, amount: i64) {
        self.cash += amount;
        self.updated_at = Utc::now();
    }
}

//! Error taxonomy for the trading core. Client mistakes (bad tick, unknown
//! order, wrong owner, terminal state) are distinct variants; lock timeouts
//! are fatal for the triggering call; store and cache failures wrap the
//! underlying driver errors.

use thiserror::Error;
use uuid::Uuid;

use crate::types::order::OrderStatus;

#[derive(Debug, Error)]
pub enum TradingError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("price {price} is not a multiple of tick size {tick_size}")]
    InvalidTick { price: i64, tick_size: i64 },

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("order {order_id} does not belong to user {user_id}")]
    Forbidden { order_id: Uuid, user_id: String },

    #[error("order {order_id} cannot be cancelled in status {status:?}")]
    InvalidOrderState {
        order_id: Uuid,
        status: OrderStatus,
    },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("insufficient holdings: required {required}, available {available}")]
    InsufficientHoldings { required: i64, available: i64 },

    #[error("could not acquire order book lock for stock {stock_id} within {waited_ms}ms")]
    LockTimeout { stock_id: String, waited_ms: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TradingError {
    /// Client errors are rejected commands, not system faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TradingError::Validation(_)
                | TradingError::InvalidTick { .. }
                | TradingError::OrderNotFound(_)
                | TradingError::Forbidden { .. }
                | TradingError::InvalidOrderState { .. }
                | TradingError::InsufficientBalance { .. }
                | TradingError::InsufficientHoldings { .. }
        )
    }
}

//! Trade persistence: append-only history, lookups for idempotency and the
//! read APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{TradeStore, investor_type_to_str, str_to_investor_type};
use crate::error::TradingError;
use crate::types::trade::{Trade, TradeId};

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: Uuid,
    buy_order_id: Uuid,
    sell_order_id: Uuid,
    buyer_id: String,
    buyer_type: String,
    seller_id: String,
    seller_type: String,
    stock_id: String,
    price: i64,
    quantity: i64,
    traded_at: DateTime<Utc>,
}

fn row_to_trade(row: TradeRow) -> Result<Trade, TradingError> {
    let buyer_type = str_to_investor_type(&row.buyer_type);
    let seller_type = str_to_investor_type(&row.seller_type);
    match (buyer_type, seller_type) {
        (Some(buyer_type), Some(seller_type)) => Ok(Trade {
            id: row.id,
            buy_order_id: row.buy_order_id,
            sell_order_id: row.sell_order_id,
            buyer_id: row.buyer_id,
            buyer_type,
            seller_id: row.seller_id,
            seller_type,
            stock_id: row.stock_id,
            price: row.price,
            quantity: row.quantity,
            traded_at: row.traded_at,
        }),
        _ => Err(TradingError::Validation(format!(
            "unreadable trade row {}",
            row.id
        ))),
    }
}

const SELECT_COLUMNS: &str = "id, buy_order_id, sell_order_id, buyer_id, buyer_type, \
     seller_id, seller_type, stock_id, price, quantity, traded_at";

pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn insert(&self, trade: &Trade) -> Result<(), TradingError> {
        sqlx::query(
            "INSERT INTO trades (id, buy_order_id, sell_order_id, buyer_id, buyer_type, \
             seller_id, seller_type, stock_id, price, quantity, trade_amount, traded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(trade.id)
        .bind(trade.buy_order_id)
        .bind(trade.sell_order_id)
        .bind(&trade.buyer_id)
        .bind(investor_type_to_str(trade.buyer_type))
        .bind(&trade.seller_id)
        .bind(investor_type_to_str(trade.seller_type))
        .bind(&trade.stock_id)
        .bind(trade.price)
        .bind(trade.quantity)
        .bind(trade.amount())
        .bind(trade.traded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, trade_id: TradeId) -> Result<Option<Trade>, TradingError> {
        let row = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM trades WHERE id = $1"
        ))
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_trade).transpose()
    }

    async fn find_by_investor(
        &self,
        investor_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM trades \
             WHERE buyer_id = $1 OR seller_id = $1 \
             ORDER BY traded_at DESC LIMIT $2"
        ))
        .bind(investor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_trade).collect()
    }

    async fn find_by_stock(
        &self,
        stock_id: &str,
        limit: usize,
    ) -> Result<Vec<Trade>, TradingError> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM trades \
             WHERE stock_id = $1 ORDER BY traded_at DESC LIMIT $2"
        ))
        .bind(stock_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_trade).collect()
    }
}

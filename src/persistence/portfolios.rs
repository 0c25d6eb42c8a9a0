//! Holding persistence: upsert per (investor, type, stock) and listings
//! for the portfolio read API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{HoldingStore, investor_type_to_str, str_to_investor_type};
use crate::error::TradingError;
use crate::types::order::InvestorType;
use crate::types::portfolio::Holding;

#[derive(Debug, sqlx::FromRow)]
struct HoldingRow {
    investor_id: String,
    investor_type: String,
    stock_id: String,
    quantity: i64,
    average_price: i64,
    total_invested: i64,
    updated_at: DateTime<Utc>,
}

fn row_to_holding(row: HoldingRow) -> Result<Holding, TradingError> {
    let investor_type = str_to_investor_type(&row.investor_type).ok_or_else(|| {
        TradingError::Validation(format!(
            "unreadable holding row for investor {}",
            row.investor_id
        ))
    })?;
    Ok(Holding {
        investor_id: row.investor_id,
        investor_type,
        stock_id: row.stock_id,
        quantity: row.quantity,
        average_price: row.average_price,
        total_invested: row.total_invested,
        updated_at: row.updated_at,
    })
}

pub struct PgHoldingStore {
    pool: PgPool,
}

impl PgHoldingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HoldingStore for PgHoldingStore {
    async fn find(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
        stock_id: &str,
    ) -> Result<Option<Holding>, TradingError> {
        let row = sqlx::query_as::<_, HoldingRow>(
            "SELECT investor_id, investor_type, stock_id, quantity, average_price, \
             total_invested, updated_at FROM portfolios \
             WHERE investor_id = $1 AND investor_type = $2 AND stock_id = $3",
        )
        .bind(investor_id)
        .bind(investor_type_to_str(investor_type))
        .bind(stock_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_holding).transpose()
    }

    async fn upsert(&self, holding: &Holding) -> Result<(), TradingError> {
        sqlx::query(
            "INSERT INTO portfolios (investor_id, investor_type, stock_id, quantity, \
             average_price, total_invested, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (investor_id, investor_type, stock_id) \
             DO UPDATE SET quantity = $4, average_price = $5, total_invested = $6, updated_at = $7",
        )
        .bind(&holding.investor_id)
        .bind(investor_type_to_str(holding.investor_type))
        .bind(&holding.stock_id)
        .bind(holding.quantity)
        .bind(holding.average_price)
        .bind(holding.total_invested)
        .bind(holding.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_for_investor(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Vec<Holding>, TradingError> {
        let rows = sqlx::query_as::<_, HoldingRow>(
            "SELECT investor_id, investor_type, stock_id, quantity, average_price, \
             total_invested, updated_at FROM portfolios \
             WHERE investor_id = $1 AND investor_type = $2 ORDER BY stock_id",
        )
        .bind(investor_id)
        .bind(investor_type_to_str(investor_type))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_holding).collect()
    }
}

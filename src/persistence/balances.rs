//! Cash balance persistence per (investor, type).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{BalanceStore, investor_type_to_str, str_to_investor_type};
use crate::error::TradingError;
use crate::types::order::InvestorType;
use crate::types::portfolio::InvestorBalance;

#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    investor_id: String,
    investor_type: String,
    cash: i64,
    updated_at: DateTime<Utc>,
}

pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn find(
        &self,
        investor_id: &str,
        investor_type: InvestorType,
    ) -> Result<Option<InvestorBalance>, TradingError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT investor_id, investor_type, cash, updated_at FROM investor_balances \
             WHERE investor_id = $1 AND investor_type = $2",
        )
        .bind(investor_id)
        .bind(investor_type_to_str(investor_type))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let investor_type = str_to_investor_type(&row.investor_type).ok_or_else(|| {
                TradingError::Validation(format!(
                    "unreadable balance row for investor {}",
                    row.investor_id
                ))
            })?;
            Ok(InvestorBalance {
                investor_id: row.investor_id,
                investor_type,
                cash: row.cash,
                updated_at: row.updated_at,
            })
        })
        .transpose()
    }

    async fn upsert(&self, balance: &InvestorBalance) -> Result<(), TradingError> {
        sqlx::query(
            "INSERT INTO investor_balances (investor_id, investor_type, cash, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (investor_id, investor_type) \
             DO UPDATE SET cash = $3, updated_at = $4",
        )
        .bind(&balance.investor_id)
        .bind(investor_type_to_str(balance.investor_type))
        .bind(balance.cash)
        .bind(balance.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! Order persistence: insert, fill/status updates, lookup, open-order scan.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{OrderStore, investor_type_to_str, str_to_investor_type};
use crate::error::TradingError;
use crate::types::order::{Order, OrderId, OrderKind, OrderSide, OrderStatus};

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "Buy",
        OrderSide::Sell => "Sell",
    }
}

fn str_to_side(s: &str) -> Option<OrderSide> {
    match s {
        "Buy" => Some(OrderSide::Buy),
        "Sell" => Some(OrderSide::Sell),
        _ => None,
    }
}

fn kind_to_str(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Limit => "Limit",
        OrderKind::Market => "Market",
    }
}

fn str_to_kind(s: &str) -> Option<OrderKind> {
    match s {
        "Limit" => Some(OrderKind::Limit),
        "Market" => Some(OrderKind::Market),
        _ => None,
    }
}

fn status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pending",
        OrderStatus::PartiallyFilled => "PartiallyFilled",
        OrderStatus::Filled => "Filled",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Rejected => "Rejected",
    }
}

fn str_to_status(s: &str) -> Option<OrderStatus> {
    match s {
        "Pending" => Some(OrderStatus::Pending),
        "PartiallyFilled" => Some(OrderStatus::PartiallyFilled),
        "Filled" => Some(OrderStatus::Filled),
        "Cancelled" => Some(OrderStatus::Cancelled),
        "Rejected" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    stock_id: String,
    side: String,
    kind: String,
    price: Option<i64>,
    quantity: i64,
    filled_quantity: i64,
    status: String,
    investor_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn row_to_order(row: OrderRow) -> Result<Order, TradingError> {
    let side = str_to_side(&row.side);
    let kind = str_to_kind(&row.kind);
    let status = str_to_status(&row.status);
    let investor_type = str_to_investor_type(&row.investor_type);
    match (side, kind, status, investor_type) {
        (Some(side), Some(kind), Some(status), Some(investor_type)) => Ok(Order {
            id: row.id,
            user_id: row.user_id,
            stock_id: row.stock_id,
            side,
            kind,
            price: row.price,
            quantity: row.quantity,
            filled_quantity: row.filled_quantity,
            status,
            investor_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }),
        _ => Err(TradingError::Validation(format!(
            "unreadable order row {}",
            row.id
        ))),
    }
}

const SELECT_COLUMNS: &str = "id, user_id, stock_id, side, kind, price, quantity, \
     filled_quantity, status, investor_type, created_at, updated_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_one(&self, order: &Order) -> Result<(), TradingError> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, stock_id, side, kind, price, quantity, \
             filled_quantity, status, investor_type, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(&order.stock_id)
        .bind(side_to_str(order.side))
        .bind(kind_to_str(order.kind))
        .bind(order.price)
        .bind(order.quantity)
        .bind(order.filled_quantity)
        .bind(status_to_str(order.status))
        .bind(investor_type_to_str(order.investor_type))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), TradingError> {
        self.insert_one(order).await
    }

    async fn insert_all(&self, orders: &[Order]) -> Result<(), TradingError> {
        for order in orders {
            self.insert_one(order).await?;
        }
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), TradingError> {
        sqlx::query(
            "UPDATE orders SET filled_quantity = $1, status = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(order.filled_quantity)
        .bind(status_to_str(order.status))
        .bind(order.updated_at)
        .bind(order.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, TradingError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_order).transpose()
    }

    async fn find_open_by_stock(&self, stock_id: &str) -> Result<Vec<Order>, TradingError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders \
             WHERE stock_id = $1 AND kind = 'Limit' \
             AND status IN ('Pending', 'PartiallyFilled') \
             ORDER BY created_at"
        ))
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_order).collect()
    }
}

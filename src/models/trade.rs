use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::order::OrderSide;

/// Append-only record of one fill event. An order accumulates one Trade
/// per execute_trade call (today always exactly one, since the engine
/// fills an order's whole remaining quantity in a single step).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trade {
    pub id: i64,
    pub order_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Decimal,
    pub executed_at: DateTime<Utc>,
}

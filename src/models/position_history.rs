use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use super::position::PositionSide;

/// Append-only record written the instant a [`crate::models::Position`]'s
/// quantity reaches zero, whether from a plain close or the closing half
/// of a flip.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PositionHistory {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub leverage: i32,
    pub realized_pnl: Decimal,
    pub total_fee: Decimal,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

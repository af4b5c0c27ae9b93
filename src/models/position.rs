use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The closure tolerance below which a position's remaining quantity is
/// treated as fully closed. Kept only for parity with callers that still
/// hand us an `f64`-derived quantity (e.g. deserialized request bodies);
/// internal accounting compares `Decimal` quantities to `Decimal::ZERO`
/// directly, since exact decimal subtraction doesn't leave float residue.
pub const POSITION_CLOSE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "position_side", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

/// One-way position: at most one row per `(account_id, symbol)`. `quantity`
/// is signed — positive is long, negative is short. Destroyed (row deleted)
/// the instant `quantity` reaches zero; a [`crate::models::PositionHistory`]
/// row is written at that moment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Position {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: i32,
    pub margin: Decimal,
    pub realized_pnl: Decimal,
    pub accumulated_fees: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn side(&self) -> PositionSide {
        if self.quantity > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// `(mark - entry) * quantity` — sign-correct for both longs (positive
    /// quantity) and shorts (negative quantity) without branching.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.entry_price) * self.quantity
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePositionTpSlRequest {
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionResponse {
    pub id: i64,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: i32,
    pub margin: Decimal,
    pub realized_pnl: Decimal,
    pub accumulated_fees: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    pub created_at: DateTime<Utc>,
}

impl PositionResponse {
    pub fn from_position(p: &Position, mark: Option<Decimal>) -> Self {
        let unrealized_pnl = mark.map(|m| p.unrealized_pnl(m)).unwrap_or(Decimal::ZERO);
        Self {
            id: p.id,
            symbol: p.symbol.clone(),
            side: p.side(),
            quantity: p.quantity,
            entry_price: p.entry_price,
            leverage: p.leverage,
            margin: p.margin,
            realized_pnl: p.realized_pnl,
            accumulated_fees: p.accumulated_fees,
            take_profit_price: p.take_profit_price,
            stop_loss_price: p.stop_loss_price,
            mark_price: mark,
            unrealized_pnl,
            created_at: p.created_at,
        }
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An account holding virtual balance and zero or more open positions.
///
/// `balance` is free cash only — margin locked up in open positions is
/// tracked on the [`crate::models::Position`] rows, not here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub user_id: String,
    pub balance: Decimal,
    pub leverage: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: String,
    pub initial_balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub leverage: i32,
}

/// Account view enriched with the live metrics computed over the price cache.
/// Mirrors the shape returned by `calculate_account_metrics` in the source.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub user_id: String,
    pub balance: Decimal,
    pub leverage: i32,
    pub equity: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: Vec<crate::models::position::PositionResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountStatistics {
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub expectancy: Decimal,
    pub profit_factor: Decimal,
    pub sharpe_ratio: Decimal,
    pub cagr: Decimal,
    pub win_rate: Decimal,
    pub total_trades: i64,
    pub average_win: Decimal,
    pub average_loss: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyPnl {
    pub date: String,
    pub pnl: Decimal,
}

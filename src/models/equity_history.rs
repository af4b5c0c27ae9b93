use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// Append-only equity snapshot, written by the Equity Recorder at its own
/// cadence — never by the matching engine.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EquityHistory {
    pub id: i64,
    pub account_id: i64,
    pub equity: Decimal,
    pub timestamp: DateTime<Utc>,
}

//! Account-level reporting statistics (`GET /accounts/{id}/statistics`).
//! Win rate, profit factor, expectancy, drawdown, Sharpe and CAGR are all
//! derived from closed positions and the equity curve — no I/O here, only
//! arithmetic, which is why it lives next to the other pure metrics code.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::{EquityHistory, PositionHistory};

#[derive(Debug, Clone, Copy, PartialEq)]
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

/// `history` must be ordered oldest-first; `equity_curve` too.
pub fn compute_account_statistics(
    history: &[PositionHistory],
    equity_curve: &[EquityHistory],
) -> AccountStatistics {
    let total_trades = history.len() as i64;
    let wins: Vec<Decimal> = history
        .iter()
        .filter(|t| t.realized_pnl > Decimal::ZERO)
        .map(|t| t.realized_pnl)
        .collect();
    let losses: Vec<Decimal> = history
        .iter()
        .filter(|t| t.realized_pnl <= Decimal::ZERO)
        .map(|t| t.realized_pnl)
        .collect();

    let win_rate = if total_trades > 0 {
        Decimal::from(wins.len() as i64) / Decimal::from(total_trades)
    } else {
        Decimal::ZERO
    };

    let average_win = mean(&wins);
    let average_loss = mean(&losses);

    let gross_profit: Decimal = wins.iter().sum();
    let gross_loss: Decimal = losses.iter().sum::<Decimal>().abs();
    let profit_factor = if gross_loss > Decimal::ZERO {
        gross_profit / gross_loss
    } else if gross_profit > Decimal::ZERO {
        Decimal::MAX
    } else {
        Decimal::ZERO
    };

    let loss_rate = Decimal::ONE - win_rate;
    let expectancy = win_rate * average_win + loss_rate * average_loss;

    let (max_drawdown, max_drawdown_pct) = compute_drawdown(equity_curve);
    let sharpe_ratio = compute_sharpe(equity_curve);
    let cagr = compute_cagr(equity_curve);

    AccountStatistics {
        max_drawdown,
        max_drawdown_pct,
        expectancy,
        profit_factor,
        sharpe_ratio,
        cagr,
        win_rate,
        total_trades,
        average_win,
        average_loss,
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len() as i64)
}

fn compute_drawdown(equity_curve: &[EquityHistory]) -> (Decimal, Decimal) {
    if equity_curve.is_empty() {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let mut peak = equity_curve[0].equity;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_pct = Decimal::ZERO;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        let dd = peak - point.equity;
        let dd_pct = if peak > Decimal::ZERO { dd / peak } else { Decimal::ZERO };
        if dd > max_dd {
            max_dd = dd;
        }
        if dd_pct > max_dd_pct {
            max_dd_pct = dd_pct;
        }
    }
    (max_dd, max_dd_pct)
}

/// Sharpe over the period-to-period returns of the equity curve,
/// annualized assuming daily sampling (`sqrt(365)`), as the source does.
/// `Decimal` has no square root, so this step alone drops to `f64`.
fn compute_sharpe(equity_curve: &[EquityHistory]) -> Decimal {
    if equity_curve.len() < 2 {
        return Decimal::ZERO;
    }
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > Decimal::ZERO {
                Some(((curr - prev) / prev).to_f64().unwrap_or(0.0))
            } else {
                None
            }
        })
        .collect();

    if returns.len() < 2 {
        return Decimal::ZERO;
    }
    let mean_ret = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean_ret).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return Decimal::ZERO;
    }
    let sharpe = (mean_ret / stdev) * (365f64).sqrt();
    Decimal::from_f64_retain(sharpe).unwrap_or(Decimal::ZERO)
}

/// Compound annual growth rate between the first and last equity points.
fn compute_cagr(equity_curve: &[EquityHistory]) -> Decimal {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return Decimal::ZERO;
    };
    let days = (last.timestamp - first.timestamp).num_days();
    if days <= 0 || first.equity <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let years = days as f64 / 365.0;
    let start = first.equity.to_f64().unwrap_or(0.0);
    let end = last.equity.to_f64().unwrap_or(0.0);
    if start <= 0.0 {
        return Decimal::ZERO;
    }
    let cagr = (end / start).powf(1.0 / years) - 1.0;
    Decimal::from_f64_retain(cagr).unwrap_or(Decimal::ZERO)
}

/// Daily realized P&L (`Σ realized_pnl - total_fee`, grouped by close day)
/// for `GET /accounts/{id}/daily-pnl?year&month`.
pub fn daily_pnl(history: &[PositionHistory], year: i32, month: u32) -> Vec<(chrono::NaiveDate, Decimal)> {
    use std::collections::BTreeMap;
    let mut by_day: BTreeMap<chrono::NaiveDate, Decimal> = BTreeMap::new();
    for row in history {
        let date = row.closed_at.date_naive();
        if date.year() == year && date.month() == month {
            *by_day.entry(date).or_insert(Decimal::ZERO) += row.realized_pnl - row.total_fee;
        }
    }
    by_day.into_iter().collect()
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn history(pnl: Decimal, closed_at: chrono::DateTime<Utc>) -> PositionHistory {
        PositionHistory {
            id: 1,
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: crate::models::PositionSide::Long,
            entry_price: dec!(30000),
            exit_price: dec!(31000),
            leverage: 10,
            realized_pnl: pnl,
            total_fee: dec!(1),
            created_at: closed_at,
            closed_at,
        }
    }

    #[test]
    fn win_rate_and_profit_factor() {
        let t1 = history(dec!(100), Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let t2 = history(dec!(-50), Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
        let stats = compute_account_statistics(&[t1, t2], &[]);
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.win_rate, dec!(0.5));
        assert_eq!(stats.profit_factor, dec!(2));
    }

    #[test]
    fn no_trades_is_all_zero() {
        let stats = compute_account_statistics(&[], &[]);
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, Decimal::ZERO);
        assert_eq!(stats.profit_factor, Decimal::ZERO);
    }

    #[test]
    fn daily_pnl_groups_by_close_day() {
        let t1 = history(dec!(100), Utc.with_ymd_and_hms(2026, 3, 5, 1, 0, 0).unwrap());
        let t2 = history(dec!(50), Utc.with_ymd_and_hms(2026, 3, 5, 23, 0, 0).unwrap());
        let t3 = history(dec!(10), Utc.with_ymd_and_hms(2026, 3, 6, 1, 0, 0).unwrap());
        let rows = daily_pnl(&[t1, t2, t3], 2026, 3);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, dec!(149)); // 100+50-1-1 fee
        assert_eq!(rows[1].1, dec!(9));
    }
}

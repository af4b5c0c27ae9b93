//! Account metrics: a pure, database-free computation. Given an account's
//! positions and a price cache snapshot, compute unrealized P&L per
//! position and the account's equity. No I/O, no sqlx types, so it's
//! directly unit-testable.

pub mod statistics;

use rust_decimal::Decimal;

use crate::cache::PriceCache;
use crate::models::{Account, Position};

/// Equity and aggregate margin/P&L for one account at the current mark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountMetrics {
    pub total_margin: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub equity: Decimal,
}

/// `(mark - entry) * quantity`, sign-correct for longs and shorts because
/// `quantity` is signed. Contributes zero if the symbol has no mark yet.
pub fn position_unrealized_pnl(position: &Position, cache: &PriceCache) -> Decimal {
    match cache.get(&position.symbol) {
        Some(mark) => position.unrealized_pnl(mark),
        None => Decimal::ZERO,
    }
}

/// `equity = balance + Σ margin + Σ unrealized_pnl`.
pub fn compute_account_metrics(account: &Account, positions: &[Position], cache: &PriceCache) -> AccountMetrics {
    let mut total_margin = Decimal::ZERO;
    let mut total_unrealized_pnl = Decimal::ZERO;
    for position in positions {
        total_margin += position.margin;
        total_unrealized_pnl += position_unrealized_pnl(position, cache);
    }
    let equity = account.balance + total_margin + total_unrealized_pnl;
    AccountMetrics {
        total_margin,
        total_unrealized_pnl,
        equity,
    }
}

/// Used by the Equity Recorder: an account is skipped for a tick unless
/// every open position's symbol currently has a mark, to avoid writing a
/// zero-P&L spike for the positions with no price yet.
pub fn all_marks_known(positions: &[Position], cache: &PriceCache) -> bool {
    positions.iter().all(|p| cache.get(&p.symbol).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn account(balance: Decimal) -> Account {
        Account {
            id: 1,
            user_id: "u1".into(),
            balance,
            leverage: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn position(symbol: &str, quantity: Decimal, entry: Decimal, margin: Decimal) -> Position {
        Position {
            id: 1,
            account_id: 1,
            symbol: symbol.to_string(),
            quantity,
            entry_price: entry,
            leverage: 10,
            margin,
            realized_pnl: Decimal::ZERO,
            accumulated_fees: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_mark_contributes_zero() {
        let cache = PriceCache::new();
        let pos = position("BTCUSDT", dec!(1), dec!(30000), dec!(3000));
        assert_eq!(position_unrealized_pnl(&pos, &cache), Decimal::ZERO);
    }

    #[test]
    fn equity_matches_balance_plus_margin_plus_unrealized() {
        let cache = PriceCache::new();
        cache.put("BTCUSDT", dec!(31000));
        let acc = account(dec!(7000));
        let positions = vec![position("BTCUSDT", dec!(1), dec!(30000), dec!(3000))];
        let metrics = compute_account_metrics(&acc, &positions, &cache);
        assert_eq!(metrics.total_margin, dec!(3000));
        assert_eq!(metrics.total_unrealized_pnl, dec!(1000));
        assert_eq!(metrics.equity, dec!(11000));
    }

    #[test]
    fn short_unrealized_pnl_is_sign_correct() {
        let cache = PriceCache::new();
        cache.put("ETHUSDT", dec!(1900));
        let pos = position("ETHUSDT", dec!(-2), dec!(2000), dec!(400));
        assert_eq!(position_unrealized_pnl(&pos, &cache), dec!(200));
    }

    #[test]
    fn all_marks_known_false_when_any_symbol_missing() {
        let cache = PriceCache::new();
        cache.put("BTCUSDT", dec!(30000));
        let positions = vec![
            position("BTCUSDT", dec!(1), dec!(30000), dec!(3000)),
            position("XYZ", dec!(1), dec!(10), dec!(1)),
        ];
        assert!(!all_marks_known(&positions, &cache));
    }
}

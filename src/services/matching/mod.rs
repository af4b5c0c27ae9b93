//! Pure position-accounting math, isolated from sqlx so the open/add/
//! reduce/close/flip cases are unit-testable without a database.
//! [`engine`] turns these outcomes into actual row mutations.

pub mod engine;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{Order, OrderSide, Position, PositionHistory, PositionSide};

/// One fill's inputs to the accounting step, after the trade/order bookkeeping
/// in execute_trade's steps 1-3 has already happened.
#[derive(Debug, Clone)]
pub struct Fill {
    pub account_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub leverage: i32,
    pub fee: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub now: DateTime<Utc>,
}

impl Fill {
    pub fn from_order(order: &Order, fill_quantity: Decimal, price: Decimal, fee: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            account_id: order.account_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: fill_quantity,
            price,
            leverage: order.leverage,
            fee,
            take_profit_price: order.take_profit_price,
            stop_loss_price: order.stop_loss_price,
            now,
        }
    }
}

/// A not-yet-persisted Position — the engine assigns `id` on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionDraft {
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

/// A not-yet-persisted PositionHistory row.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHistoryDraft {
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

/// The new values for an existing Position row: an add in the same
/// direction, or a partial close that doesn't fully close it.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: i32,
    pub margin: Decimal,
    pub realized_pnl: Decimal,
    pub accumulated_fees: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    /// No prior position for `(account, symbol)`: opens a fresh one.
    Open(PositionDraft),
    /// An add in the same direction, or a reduce that doesn't reach zero.
    Update(PositionUpdate),
    /// A full close with no remainder to flip.
    Close(PositionHistoryDraft),
    /// A full close with a remainder — flips through zero into the
    /// opposite direction.
    CloseAndOpen(PositionHistoryDraft, PositionDraft),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    /// Net change to `Account.balance` from this fill (fee + margin +
    /// realized P&L, as applicable to the branch taken).
    pub balance_delta: Decimal,
    pub change: PositionChange,
}

/// Apply one fill to the existing position (if any) for
/// `(fill.account_id, fill.symbol)`, covering open/add/reduce/close/flip.
pub fn apply_fill(existing: Option<&Position>, fill: &Fill) -> FillOutcome {
    let fee_delta = -fill.fee;

    match existing {
        None => {
            // No existing position: open a fresh one in the fill's direction.
            let margin = fill.price * fill.quantity / Decimal::from(fill.leverage);
            let signed_qty = fill.quantity * fill.side.sign();
            FillOutcome {
                balance_delta: fee_delta - margin,
                change: PositionChange::Open(PositionDraft {
                    account_id: fill.account_id,
                    symbol: fill.symbol.clone(),
                    quantity: signed_qty,
                    entry_price: fill.price,
                    leverage: fill.leverage,
                    margin,
                    realized_pnl: Decimal::ZERO,
                    accumulated_fees: fill.fee,
                    take_profit_price: fill.take_profit_price,
                    stop_loss_price: fill.stop_loss_price,
                    created_at: fill.now,
                }),
            }
        }
        Some(position) => {
            let incoming_sign = fill.side.sign();
            let position_sign = if position.quantity > Decimal::ZERO { Decimal::ONE } else { -Decimal::ONE };

            if incoming_sign == position_sign {
                // Same direction as the existing position: adding to it.
                let margin = fill.price * fill.quantity / Decimal::from(fill.leverage);
                let prev_abs = position.quantity.abs();
                let new_abs = prev_abs + fill.quantity;
                let entry = (prev_abs * position.entry_price + fill.price * fill.quantity) / new_abs;
                FillOutcome {
                    balance_delta: fee_delta - margin,
                    change: PositionChange::Update(PositionUpdate {
                        quantity: new_abs * position_sign,
                        entry_price: entry,
                        leverage: fill.leverage,
                        margin: position.margin + margin,
                        realized_pnl: position.realized_pnl,
                        accumulated_fees: position.accumulated_fees + fill.fee,
                        take_profit_price: fill.take_profit_price.or(position.take_profit_price),
                        stop_loss_price: fill.stop_loss_price.or(position.stop_loss_price),
                    }),
                }
            } else {
                // Opposite direction: reducing, closing, or flipping through zero.
                let prev_abs = position.quantity.abs();
                let close_qty = fill.quantity.min(prev_abs);
                let remainder = fill.quantity - close_qty;

                let pnl = if position.is_long() {
                    (fill.price - position.entry_price) * close_qty
                } else {
                    (position.entry_price - fill.price) * close_qty
                };
                let margin_released = (close_qty / prev_abs) * position.margin;
                let close_balance_delta = margin_released + pnl;

                let remaining_abs = prev_abs - close_qty;
                let realized_pnl = position.realized_pnl + pnl;
                let accumulated_fees = position.accumulated_fees + fill.fee;

                if remaining_abs == Decimal::ZERO {
                    let history = PositionHistoryDraft {
                        account_id: fill.account_id,
                        symbol: fill.symbol.clone(),
                        side: position.side(),
                        entry_price: position.entry_price,
                        exit_price: fill.price,
                        leverage: position.leverage,
                        realized_pnl,
                        total_fee: accumulated_fees,
                        created_at: position.created_at,
                        closed_at: fill.now,
                    };

                    if remainder > Decimal::ZERO {
                        let margin_flip = fill.price * remainder / Decimal::from(fill.leverage);
                        FillOutcome {
                            balance_delta: fee_delta + close_balance_delta - margin_flip,
                            change: PositionChange::CloseAndOpen(
                                history,
                                PositionDraft {
                                    account_id: fill.account_id,
                                    symbol: fill.symbol.clone(),
                                    quantity: remainder * incoming_sign,
                                    entry_price: fill.price,
                                    leverage: fill.leverage,
                                    margin: margin_flip,
                                    realized_pnl: Decimal::ZERO,
                                    accumulated_fees: Decimal::ZERO,
                                    take_profit_price: fill.take_profit_price,
                                    stop_loss_price: fill.stop_loss_price,
                                    created_at: fill.now,
                                },
                            ),
                        }
                    } else {
                        FillOutcome {
                            balance_delta: fee_delta + close_balance_delta,
                            change: PositionChange::Close(history),
                        }
                    }
                } else {
                    FillOutcome {
                        balance_delta: fee_delta + close_balance_delta,
                        change: PositionChange::Update(PositionUpdate {
                            quantity: remaining_abs * position_sign,
                            entry_price: position.entry_price,
                            leverage: position.leverage,
                            margin: position.margin - margin_released,
                            realized_pnl,
                            accumulated_fees,
                            take_profit_price: position.take_profit_price,
                            stop_loss_price: position.stop_loss_price,
                        }),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn open_position(symbol: &str, quantity: Decimal, entry: Decimal, leverage: i32, margin: Decimal) -> Position {
        Position {
            id: 1,
            account_id: 1,
            symbol: symbol.to_string(),
            quantity,
            entry_price: entry,
            leverage,
            margin,
            realized_pnl: Decimal::ZERO,
            accumulated_fees: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            created_at: now(),
        }
    }

    /// Open/close a long: BUY 1 BTC @30000 L10, then SELL 1 @31000.
    #[test]
    fn open_close_long() {
        let fill = Fill {
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(1),
            price: dec!(30000),
            leverage: 10,
            fee: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            now: now(),
        };
        let outcome = apply_fill(None, &fill);
        assert_eq!(outcome.balance_delta, dec!(-3000));
        let PositionChange::Open(draft) = outcome.change else { panic!("expected Open") };
        assert_eq!(draft.quantity, dec!(1));
        assert_eq!(draft.entry_price, dec!(30000));
        assert_eq!(draft.margin, dec!(3000));

        let position = open_position("BTCUSDT", dec!(1), dec!(30000), 10, dec!(3000));
        let close = Fill {
            side: OrderSide::Sell,
            quantity: dec!(1),
            price: dec!(31000),
            ..fill
        };
        let outcome = apply_fill(Some(&position), &close);
        // balance delta = released margin (3000) + pnl (1000) = 4000
        assert_eq!(outcome.balance_delta, dec!(4000));
        let PositionChange::Close(history) = outcome.change else { panic!("expected Close") };
        assert_eq!(history.side, PositionSide::Long);
        assert_eq!(history.entry_price, dec!(30000));
        assert_eq!(history.exit_price, dec!(31000));
        assert_eq!(history.realized_pnl, dec!(1000));
    }

    /// Short with a stop-loss: SELL 2 ETH @2000 L10, SL triggers BUY 2 @2100.
    #[test]
    fn short_with_sl_trigger() {
        let open = Fill {
            account_id: 1,
            symbol: "ETHUSDT".into(),
            side: OrderSide::Sell,
            quantity: dec!(2),
            price: dec!(2000),
            leverage: 10,
            fee: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: Some(dec!(2100)),
            now: now(),
        };
        let outcome = apply_fill(None, &open);
        assert_eq!(outcome.balance_delta, dec!(-400));
        let PositionChange::Open(draft) = outcome.change else { panic!("expected Open") };
        assert_eq!(draft.quantity, dec!(-2));
        assert_eq!(draft.margin, dec!(400));

        let position = open_position("ETHUSDT", dec!(-2), dec!(2000), 10, dec!(400));
        let close = Fill {
            side: OrderSide::Buy,
            quantity: dec!(2),
            price: dec!(2100),
            stop_loss_price: None,
            ..open
        };
        let outcome = apply_fill(Some(&position), &close);
        // pnl = (2000-2100)*2 = -200; released margin 400; delta = 200
        assert_eq!(outcome.balance_delta, dec!(200));
        let PositionChange::Close(history) = outcome.change else { panic!("expected Close") };
        assert_eq!(history.realized_pnl, dec!(-200));
    }

    /// Partial close: BUY 10 SOL @100 L10, then SELL 4 @110.
    #[test]
    fn partial_close_releases_margin_proportionally() {
        let position = open_position("SOLUSDT", dec!(10), dec!(100), 10, dec!(100));
        let fill = Fill {
            account_id: 1,
            symbol: "SOLUSDT".into(),
            side: OrderSide::Sell,
            quantity: dec!(4),
            price: dec!(110),
            leverage: 10,
            fee: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            now: now(),
        };
        let outcome = apply_fill(Some(&position), &fill);
        // pnl = (110-100)*4 = 40; released = 4/10*100 = 40; delta = 80
        assert_eq!(outcome.balance_delta, dec!(80));
        let PositionChange::Update(update) = outcome.change else { panic!("expected Update") };
        assert_eq!(update.quantity, dec!(6));
        assert_eq!(update.margin, dec!(60));
        assert_eq!(update.entry_price, dec!(100));
        assert_eq!(update.realized_pnl, dec!(40));
    }

    /// Flip through zero: long 1 @30000 margin 3000, SELL 2 @29000.
    #[test]
    fn flip_through_zero() {
        let position = open_position("BTCUSDT", dec!(1), dec!(30000), 10, dec!(3000));
        let fill = Fill {
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            quantity: dec!(2),
            price: dec!(29000),
            leverage: 10,
            fee: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            now: now(),
        };
        let outcome = apply_fill(Some(&position), &fill);
        // close: pnl=(29000-30000)*1=-1000, release 3000, delta=2000
        // flip: margin = 29000*1/10=2900, delta -= 2900 => total -900
        assert_eq!(outcome.balance_delta, dec!(-900));
        let PositionChange::CloseAndOpen(history, draft) = outcome.change else { panic!("expected CloseAndOpen") };
        assert_eq!(history.side, PositionSide::Long);
        assert_eq!(history.realized_pnl, dec!(-1000));
        assert_eq!(draft.quantity, dec!(-1));
        assert_eq!(draft.entry_price, dec!(29000));
        assert_eq!(draft.margin, dec!(2900));
    }

    #[test]
    fn leverage_on_add_overwrites_position_leverage() {
        let position = open_position("BTCUSDT", dec!(1), dec!(30000), 10, dec!(3000));
        let fill = Fill {
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(1),
            price: dec!(30000),
            leverage: 20,
            fee: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            now: now(),
        };
        let outcome = apply_fill(Some(&position), &fill);
        let PositionChange::Update(update) = outcome.change else { panic!("expected Update") };
        assert_eq!(update.leverage, 20);
    }

    #[test]
    fn fee_always_deducted_from_balance() {
        let fill = Fill {
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(1),
            price: dec!(30000),
            leverage: 10,
            fee: dec!(13.5),
            take_profit_price: None,
            stop_loss_price: None,
            now: now(),
        };
        let outcome = apply_fill(None, &fill);
        assert_eq!(outcome.balance_delta, dec!(-3013.5));
    }

    #[test]
    fn tp_sl_not_overwritten_when_order_supplies_none_on_add() {
        let mut position = open_position("BTCUSDT", dec!(1), dec!(30000), 10, dec!(3000));
        position.take_profit_price = Some(dec!(32000));
        let fill = Fill {
            account_id: 1,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(1),
            price: dec!(30000),
            leverage: 10,
            fee: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            now: now(),
        };
        let outcome = apply_fill(Some(&position), &fill);
        let PositionChange::Update(update) = outcome.change else { panic!("expected Update") };
        assert_eq!(update.take_profit_price, Some(dec!(32000)));
    }
}

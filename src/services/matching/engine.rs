//! Matching engine: a single cooperative loop at ~1 Hz that scans open
//! orders against the price cache, fills them, mutates position/balance
//! state, and then scans positions for TP/SL triggers.
//!
//! Per-order isolation: one order's failure is logged and the tick
//! continues to the next order rather than aborting the whole tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::cache::PriceCache;
use crate::models::{Order, OrderSide, OrderStatus, OrderType, Position};
use crate::services::matching::{apply_fill, Fill, PositionChange};
use crate::services::notify::AccountNotifier;

#[derive(Debug, thiserror::Error)]
pub enum MatchingEngineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("account {0} not found during fill")]
    AccountMissing(i64),
}

/// Pure decision of spec.md §4.4.1: MARKET is always executable; LIMIT BUY
/// needs `mark <= limit`, LIMIT SELL needs `mark >= limit`. No sqlx types
/// involved, so it's directly unit-testable against S5.
fn is_executable(order_type: OrderType, side: OrderSide, limit_price: Option<Decimal>, mark: Decimal) -> bool {
    match order_type {
        OrderType::Market => true,
        OrderType::Limit => {
            let limit = limit_price.unwrap_or(Decimal::ZERO);
            match side {
                OrderSide::Buy => mark <= limit,
                OrderSide::Sell => mark >= limit,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpSlTrigger {
    TakeProfit,
    StopLoss,
}

/// Pure decision of spec.md §4.4.4: for a long, TP fires at `mark >= tp`,
/// else SL at `mark <= sl`; for a short, TP at `mark <= tp`, else SL at
/// `mark >= sl`. TP is checked first — mutually exclusive within one call.
/// Returns `None` if neither is set or neither condition holds.
fn tp_sl_trigger(
    is_long: bool,
    take_profit_price: Option<Decimal>,
    stop_loss_price: Option<Decimal>,
    mark: Decimal,
) -> Option<TpSlTrigger> {
    let tp_hit = take_profit_price.is_some_and(|tp| if is_long { mark >= tp } else { mark <= tp });
    if tp_hit {
        return Some(TpSlTrigger::TakeProfit);
    }
    let sl_hit = stop_loss_price.is_some_and(|sl| if is_long { mark <= sl } else { mark >= sl });
    if sl_hit {
        return Some(TpSlTrigger::StopLoss);
    }
    None
}

pub struct MatchingEngine {
    pool: PgPool,
    cache: Arc<PriceCache>,
    notifier: Arc<AccountNotifier>,
    market_fee_rate: Decimal,
    limit_fee_rate: Decimal,
    tick_interval: Duration,
    running: Arc<AtomicBool>,
}

impl MatchingEngine {
    pub fn new(
        pool: PgPool,
        cache: Arc<PriceCache>,
        notifier: Arc<AccountNotifier>,
        market_fee_rate: Decimal,
        limit_fee_rate: Decimal,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            notifier,
            market_fee_rate,
            limit_fee_rate,
            tick_interval,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Long-lived loop: `process_open_orders` then `check_positions_tp_sl`,
    /// sleeping `tick_interval` between ticks, until `stop()` is called.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("matching engine started");
        while self.running.load(Ordering::SeqCst) {
            if let Err(err) = self.process_open_orders().await {
                tracing::error!(%err, "matching engine tick: open-order scan failed");
            }
            if let Err(err) = self.check_positions_tp_sl().await {
                tracing::error!(%err, "matching engine tick: tp/sl scan failed");
            }
            tokio::time::sleep(self.tick_interval).await;
        }
        tracing::info!("matching engine stopped");
    }

    /// Scan NEW/PARTIALLY_FILLED orders, fill the executable ones against
    /// the current mark. Ordered by id ascending so fills within one
    /// account are applied deterministically.
    async fn process_open_orders(&self) -> Result<(), MatchingEngineError> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, account_id, symbol, side, order_type, limit_price, avg_price,
                   quantity, filled_quantity, leverage, take_profit_price, stop_loss_price,
                   fee, status, created_at, updated_at
            FROM orders
            WHERE status IN ('NEW', 'PARTIALLY_FILLED')
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for order in orders {
            let Some(mark) = self.cache.get(&order.symbol) else {
                continue;
            };
            if mark <= Decimal::ZERO {
                continue;
            }

            if is_executable(order.order_type, order.side, order.limit_price, mark) {
                // Per-order isolation: a failure here is logged, not
                // propagated, so the rest of this tick's orders still run.
                if let Err(err) = self.execute_trade(&order, mark).await {
                    tracing::error!(order_id = order.id, %err, "order fill failed");
                }
            }
        }

        Ok(())
    }

    /// Fill `order`'s entire remaining quantity at `price` in one
    /// committed transaction: fee, trade row, order update, and the
    /// position/balance mutation.
    pub async fn execute_trade(&self, order: &Order, price: Decimal) -> Result<(), MatchingEngineError> {
        let fill_qty = order.remaining_quantity();
        if fill_qty <= Decimal::ZERO {
            return Ok(());
        }

        let fee_rate = match order.order_type {
            OrderType::Market => self.market_fee_rate,
            OrderType::Limit => self.limit_fee_rate,
        };
        let fee = price * fill_qty * fee_rate;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO trades (order_id, symbol, side, price, quantity, commission, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id)
        .bind(&order.symbol)
        .bind(order.side)
        .bind(price)
        .bind(fill_qty)
        .bind(fee)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let new_filled = order.filled_quantity + fill_qty;
        let new_avg = (order.avg_price * order.filled_quantity + price * fill_qty) / new_filled;
        let new_status = if new_filled >= order.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET avg_price = $1, filled_quantity = $2, fee = fee + $3, status = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(new_avg)
        .bind(new_filled)
        .bind(fee)
        .bind(new_status)
        .bind(now)
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        // The accounts row touched by this fill must be read FOR UPDATE
        // within this transaction: the HTTP order-create path and this
        // engine both read Accounts, and this serializes concurrent fills.
        let balance: Option<(Decimal,)> = sqlx::query_as("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(order.account_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((balance,)) = balance else {
            return Err(MatchingEngineError::AccountMissing(order.account_id));
        };

        let existing: Option<Position> = sqlx::query_as(
            r#"
            SELECT id, account_id, symbol, quantity, entry_price, leverage, margin,
                   realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at
            FROM positions
            WHERE account_id = $1 AND symbol = $2
            "#,
        )
        .bind(order.account_id)
        .bind(&order.symbol)
        .fetch_optional(&mut *tx)
        .await?;

        let fill = Fill::from_order(order, fill_qty, price, fee, now);
        let outcome = apply_fill(existing.as_ref(), &fill);

        match outcome.change {
            PositionChange::Open(draft) => {
                sqlx::query(
                    r#"
                    INSERT INTO positions
                        (account_id, symbol, quantity, entry_price, leverage, margin,
                         realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(draft.account_id)
                .bind(&draft.symbol)
                .bind(draft.quantity)
                .bind(draft.entry_price)
                .bind(draft.leverage)
                .bind(draft.margin)
                .bind(draft.realized_pnl)
                .bind(draft.accumulated_fees)
                .bind(draft.take_profit_price)
                .bind(draft.stop_loss_price)
                .bind(draft.created_at)
                .execute(&mut *tx)
                .await?;
            }
            PositionChange::Update(update) => {
                let position_id = existing.as_ref().expect("Update implies an existing position").id;
                sqlx::query(
                    r#"
                    UPDATE positions
                    SET quantity = $1, entry_price = $2, leverage = $3, margin = $4,
                        realized_pnl = $5, accumulated_fees = $6, take_profit_price = $7, stop_loss_price = $8
                    WHERE id = $9
                    "#,
                )
                .bind(update.quantity)
                .bind(update.entry_price)
                .bind(update.leverage)
                .bind(update.margin)
                .bind(update.realized_pnl)
                .bind(update.accumulated_fees)
                .bind(update.take_profit_price)
                .bind(update.stop_loss_price)
                .bind(position_id)
                .execute(&mut *tx)
                .await?;
            }
            PositionChange::Close(history) => {
                let position_id = existing.as_ref().expect("Close implies an existing position").id;
                insert_position_history(&mut tx, &history).await?;
                sqlx::query("DELETE FROM positions WHERE id = $1")
                    .bind(position_id)
                    .execute(&mut *tx)
                    .await?;
            }
            PositionChange::CloseAndOpen(history, draft) => {
                let position_id = existing.as_ref().expect("CloseAndOpen implies an existing position").id;
                insert_position_history(&mut tx, &history).await?;
                sqlx::query("DELETE FROM positions WHERE id = $1")
                    .bind(position_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    r#"
                    INSERT INTO positions
                        (account_id, symbol, quantity, entry_price, leverage, margin,
                         realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(draft.account_id)
                .bind(&draft.symbol)
                .bind(draft.quantity)
                .bind(draft.entry_price)
                .bind(draft.leverage)
                .bind(draft.margin)
                .bind(draft.realized_pnl)
                .bind(draft.accumulated_fees)
                .bind(draft.take_profit_price)
                .bind(draft.stop_loss_price)
                .bind(draft.created_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        let new_balance = balance + outcome.balance_delta;
        sqlx::query("UPDATE accounts SET balance = $1, updated_at = $2 WHERE id = $3")
            .bind(new_balance)
            .bind(now)
            .bind(order.account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            symbol = %order.symbol,
            side = ?order.side,
            quantity = %fill_qty,
            price = %price,
            fee = %fee,
            "order filled"
        );
        self.notifier.notify(order.account_id);

        Ok(())
    }

    /// TP first, then SL, mutually exclusive per tick. A trigger
    /// synthesizes an opposite-side MARKET order for the full position
    /// size, commits it as NEW, then executes it immediately.
    async fn check_positions_tp_sl(&self) -> Result<(), MatchingEngineError> {
        let positions: Vec<Position> = sqlx::query_as(
            r#"
            SELECT id, account_id, symbol, quantity, entry_price, leverage, margin,
                   realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at
            FROM positions
            WHERE take_profit_price IS NOT NULL OR stop_loss_price IS NOT NULL
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for position in positions {
            let Some(mark) = self.cache.get(&position.symbol) else {
                continue;
            };
            if mark <= Decimal::ZERO {
                continue;
            }

            let Some(trigger) = tp_sl_trigger(
                position.is_long(),
                position.take_profit_price,
                position.stop_loss_price,
                mark,
            ) else {
                continue;
            };
            tracing::debug!(position_id = position.id, ?trigger, "tp/sl triggered");

            let closing_side = if position.is_long() { OrderSide::Sell } else { OrderSide::Buy };
            if let Err(err) = self.synthesize_and_execute(&position, closing_side, mark).await {
                tracing::error!(position_id = position.id, %err, "tp/sl synthesized order failed");
            }
        }

        Ok(())
    }

    async fn synthesize_and_execute(
        &self,
        position: &Position,
        side: OrderSide,
        mark: Decimal,
    ) -> Result<(), MatchingEngineError> {
        let now = Utc::now();
        let order: Order = sqlx::query_as(
            r#"
            INSERT INTO orders
                (account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                 filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, 'MARKET', NULL, 0, $4, 0, $5, NULL, NULL, 0, 'NEW', $6, $6)
            RETURNING id, account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                      filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                      created_at, updated_at
            "#,
        )
        .bind(position.account_id)
        .bind(&position.symbol)
        .bind(side)
        .bind(position.quantity.abs())
        .bind(position.leverage)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.execute_trade(&order, mark).await
    }
}

async fn insert_position_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    history: &crate::services::matching::PositionHistoryDraft,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO position_history
            (account_id, symbol, side, entry_price, exit_price, leverage, realized_pnl,
             total_fee, created_at, closed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(history.account_id)
    .bind(&history.symbol)
    .bind(history.side)
    .bind(history.entry_price)
    .bind(history.exit_price)
    .bind(history.leverage)
    .bind(history.realized_pnl)
    .bind(history.total_fee)
    .bind(history.created_at)
    .bind(history.closed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_orders_are_always_executable() {
        assert!(is_executable(OrderType::Market, OrderSide::Buy, None, dec!(30000)));
        assert!(is_executable(OrderType::Market, OrderSide::Sell, None, dec!(30000)));
    }

    /// S5: BUY LIMIT @29500 rests while mark is 30000, then fires the
    /// instant mark crosses 29500 — at the mark, not the limit price.
    #[test]
    fn limit_buy_executes_once_mark_falls_to_or_below_limit() {
        assert!(!is_executable(OrderType::Limit, OrderSide::Buy, Some(dec!(29500)), dec!(30000)));
        assert!(is_executable(OrderType::Limit, OrderSide::Buy, Some(dec!(29500)), dec!(29400)));
        assert!(is_executable(OrderType::Limit, OrderSide::Buy, Some(dec!(29500)), dec!(29500)));
    }

    #[test]
    fn limit_sell_executes_once_mark_rises_to_or_above_limit() {
        assert!(!is_executable(OrderType::Limit, OrderSide::Sell, Some(dec!(31000)), dec!(30000)));
        assert!(is_executable(OrderType::Limit, OrderSide::Sell, Some(dec!(31000)), dec!(31500)));
        assert!(is_executable(OrderType::Limit, OrderSide::Sell, Some(dec!(31000)), dec!(31000)));
    }

    #[test]
    fn long_take_profit_triggers_above_tp() {
        let trigger = tp_sl_trigger(true, Some(dec!(32000)), Some(dec!(28000)), dec!(32500));
        assert_eq!(trigger, Some(TpSlTrigger::TakeProfit));
    }

    /// S2: short with SL=2100, mark reaches 2100.
    #[test]
    fn short_stop_loss_triggers_at_or_above_sl() {
        let trigger = tp_sl_trigger(false, None, Some(dec!(2100)), dec!(2100));
        assert_eq!(trigger, Some(TpSlTrigger::StopLoss));
    }

    #[test]
    fn no_trigger_when_mark_is_between_tp_and_sl() {
        let trigger = tp_sl_trigger(true, Some(dec!(32000)), Some(dec!(28000)), dec!(30000));
        assert_eq!(trigger, None);
    }

    /// TP is evaluated before SL and the two are mutually exclusive: a
    /// long whose mark happens to satisfy both conditions (a degenerate
    /// TP <= SL configuration) reports TakeProfit, never both.
    #[test]
    fn take_profit_takes_priority_over_stop_loss() {
        let trigger = tp_sl_trigger(true, Some(dec!(29000)), Some(dec!(31000)), dec!(32000));
        assert_eq!(trigger, Some(TpSlTrigger::TakeProfit));
    }

    #[test]
    fn no_trigger_without_tp_or_sl_set() {
        assert_eq!(tp_sl_trigger(true, None, None, dec!(100000)), None);
    }
}

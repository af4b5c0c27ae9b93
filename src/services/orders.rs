//! Order submission: a thin boundary that validates, inserts/updates
//! rows, and fires an account notification. It never executes a trade
//! itself; the matching engine is the only thing that calls
//! `execute_trade`, which is what prevents a submission/engine race on
//! the same order.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::{
    Account, AmendOrderRequest, CreateAccountRequest, CreateOrderRequest, Order, OrderStatus,
    OrderType, Position, UpdateAccountRequest, UpdatePositionTpSlRequest,
};
use crate::services::notify::AccountNotifier;

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("account {0} not found")]
    AccountNotFound(i64),
    #[error("order {0} not found")]
    OrderNotFound(i64),
    #[error("position {0} not found")]
    PositionNotFound(i64),
    #[error("limit order requires a price")]
    LimitOrderRequiresPrice,
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("leverage must be positive")]
    InvalidLeverage,
    #[error("order {0} is not cancelable in its current state")]
    NotCancelable(i64),
    #[error("order {0} is not amendable in its current state")]
    NotAmendable(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct OrderSubmissionService {
    pool: PgPool,
    notifier: std::sync::Arc<AccountNotifier>,
}

impl OrderSubmissionService {
    pub fn new(pool: PgPool, notifier: std::sync::Arc<AccountNotifier>) -> Self {
        Self { pool, notifier }
    }

    pub async fn create_account(
        &self,
        req: CreateAccountRequest,
        default_balance: Decimal,
        default_leverage: i32,
    ) -> Result<Account, SubmissionError> {
        if let Some(existing) = self.find_account_by_user_id(&req.user_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let balance = req.initial_balance.unwrap_or(default_balance);
        let account: Account = sqlx::query_as(
            r#"
            INSERT INTO accounts (user_id, balance, leverage, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, user_id, balance, leverage, created_at, updated_at
            "#,
        )
        .bind(&req.user_id)
        .bind(balance)
        .bind(default_leverage)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    /// Account-settings update: only `leverage` (the per-user default
    /// applied to new positions, not a historical position's leverage) is
    /// mutable this way.
    pub async fn update_account_settings(
        &self,
        account_id: i64,
        req: UpdateAccountRequest,
    ) -> Result<Account, SubmissionError> {
        if req.leverage <= 0 {
            return Err(SubmissionError::InvalidLeverage);
        }
        let now = Utc::now();
        let account: Account = sqlx::query_as(
            r#"
            UPDATE accounts SET leverage = $1, updated_at = $2 WHERE id = $3
            RETURNING id, user_id, balance, leverage, created_at, updated_at
            "#,
        )
        .bind(req.leverage)
        .bind(now)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SubmissionError::AccountNotFound(account_id))?;
        self.notifier.notify(account_id);
        Ok(account)
    }

    async fn find_account_by_user_id(&self, user_id: &str) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as("SELECT id, user_id, balance, leverage, created_at, updated_at FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_account(&self, account_id: i64) -> Result<Account, SubmissionError> {
        sqlx::query_as("SELECT id, user_id, balance, leverage, created_at, updated_at FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SubmissionError::AccountNotFound(account_id))
    }

    pub async fn list_orders(&self, account_id: i64) -> Result<Vec<Order>, SubmissionError> {
        let orders = sqlx::query_as(
            r#"
            SELECT id, account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                   filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                   created_at, updated_at
            FROM orders WHERE account_id = $1 ORDER BY id DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Never executes inline: inserts status=NEW and returns. The engine's
    /// next tick is the only thing that fills this order.
    pub async fn create_order(&self, req: CreateOrderRequest) -> Result<Order, SubmissionError> {
        if req.quantity <= Decimal::ZERO {
            return Err(SubmissionError::InvalidQuantity);
        }
        if req.leverage <= 0 {
            return Err(SubmissionError::InvalidLeverage);
        }
        if req.order_type == OrderType::Limit && req.price.is_none() {
            return Err(SubmissionError::LimitOrderRequiresPrice);
        }
        self.get_account(req.account_id).await?;

        let now = Utc::now();
        let order: Order = sqlx::query_as(
            r#"
            INSERT INTO orders
                (account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                 filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, 0, $7, $8, $9, 0, 'NEW', $10, $10)
            RETURNING id, account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                      filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                      created_at, updated_at
            "#,
        )
        .bind(req.account_id)
        .bind(&req.symbol)
        .bind(req.side)
        .bind(req.order_type)
        .bind(req.price)
        .bind(req.quantity)
        .bind(req.leverage)
        .bind(req.take_profit_price)
        .bind(req.stop_loss_price)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.notifier.notify(req.account_id);
        Ok(order)
    }

    pub async fn cancel_order(&self, order_id: i64) -> Result<Order, SubmissionError> {
        let order = self.get_order(order_id).await?;
        if !order.status.is_open() {
            return Err(SubmissionError::NotCancelable(order_id));
        }
        let now = Utc::now();
        let updated: Order = sqlx::query_as(
            r#"
            UPDATE orders SET status = 'CANCELED', updated_at = $1 WHERE id = $2
            RETURNING id, account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                      filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                      created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;
        self.notifier.notify(updated.account_id);
        Ok(updated)
    }

    /// TP/SL editable in NEW or PARTIALLY_FILLED; price/quantity only in NEW.
    pub async fn amend_order(&self, order_id: i64, req: AmendOrderRequest) -> Result<Order, SubmissionError> {
        let order = self.get_order(order_id).await?;
        if !order.status.is_open() {
            return Err(SubmissionError::NotAmendable(order_id));
        }
        if (req.price.is_some() || req.quantity.is_some()) && order.status != OrderStatus::New {
            return Err(SubmissionError::NotAmendable(order_id));
        }

        let new_price = req.price.or(order.limit_price);
        let new_quantity = req.quantity.unwrap_or(order.quantity);
        let new_tp = req.take_profit_price.or(order.take_profit_price);
        let new_sl = req.stop_loss_price.or(order.stop_loss_price);
        let now = Utc::now();

        let updated: Order = sqlx::query_as(
            r#"
            UPDATE orders
            SET limit_price = $1, quantity = $2, take_profit_price = $3, stop_loss_price = $4, updated_at = $5
            WHERE id = $6
            RETURNING id, account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                      filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                      created_at, updated_at
            "#,
        )
        .bind(new_price)
        .bind(new_quantity)
        .bind(new_tp)
        .bind(new_sl)
        .bind(now)
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        self.notifier.notify(updated.account_id);
        Ok(updated)
    }

    async fn get_order(&self, order_id: i64) -> Result<Order, SubmissionError> {
        sqlx::query_as(
            r#"
            SELECT id, account_id, symbol, side, order_type, limit_price, avg_price, quantity,
                   filled_quantity, leverage, take_profit_price, stop_loss_price, fee, status,
                   created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SubmissionError::OrderNotFound(order_id))
    }

    pub async fn update_position_tp_sl(
        &self,
        position_id: i64,
        req: UpdatePositionTpSlRequest,
    ) -> Result<Position, SubmissionError> {
        let position: Position = sqlx::query_as(
            r#"
            UPDATE positions SET take_profit_price = $1, stop_loss_price = $2 WHERE id = $3
            RETURNING id, account_id, symbol, quantity, entry_price, leverage, margin,
                      realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at
            "#,
        )
        .bind(req.take_profit_price)
        .bind(req.stop_loss_price)
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SubmissionError::PositionNotFound(position_id))?;

        self.notifier.notify(position.account_id);
        Ok(position)
    }
}

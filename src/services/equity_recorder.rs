//! Equity recorder: every tick, for every account whose open positions
//! all have a known mark, compute equity and append one row to
//! `equity_history`. Accounts with a position missing a mark are skipped
//! for that tick, to avoid recording a spurious P&L-equals-zero spike
//! for the unpriced symbol. All rows for a tick are written in one
//! transaction, committed once after the full account loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::cache::PriceCache;
use crate::metrics::{all_marks_known, compute_account_metrics};
use crate::models::{Account, Position};

pub struct EquityRecorder {
    pool: PgPool,
    cache: Arc<PriceCache>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl EquityRecorder {
    pub fn new(pool: PgPool, cache: Arc<PriceCache>, interval: Duration) -> Self {
        Self {
            pool,
            cache,
            interval,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn run(self) {
        tracing::info!("equity recorder started");
        while self.running.load(Ordering::SeqCst) {
            if let Err(err) = self.record_all().await {
                tracing::error!(%err, "equity recorder tick failed");
            }
            tokio::time::sleep(self.interval).await;
        }
        tracing::info!("equity recorder stopped");
    }

    /// One transaction per tick: every account's equity row (or skip) is
    /// decided within it, and it commits once after the loop, matching
    /// spec.md §4.5's "Commit once per tick".
    async fn record_all(&self) -> Result<(), sqlx::Error> {
        let accounts: Vec<Account> = sqlx::query_as("SELECT id, user_id, balance, leverage, created_at, updated_at FROM accounts")
            .fetch_all(&self.pool)
            .await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for account in accounts {
            let positions: Vec<Position> = sqlx::query_as(
                r#"
                SELECT id, account_id, symbol, quantity, entry_price, leverage, margin,
                       realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at
                FROM positions
                WHERE account_id = $1
                "#,
            )
            .bind(account.id)
            .fetch_all(&mut *tx)
            .await?;

            if !all_marks_known(&positions, &self.cache) {
                tracing::warn!(account_id = account.id, "skipping equity record: missing mark");
                continue;
            }

            let metrics = compute_account_metrics(&account, &positions, &self.cache);
            sqlx::query("INSERT INTO equity_history (account_id, equity, timestamp) VALUES ($1, $2, $3)")
                .bind(account.id)
                .bind(metrics.equity)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

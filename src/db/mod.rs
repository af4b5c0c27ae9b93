//! Database connection and schema bootstrap: an idempotent
//! `CREATE TABLE IF NOT EXISTS` run once from [`Database::connect`],
//! rather than a separate migration tool.

use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.bootstrap_schema().await?;
        Ok(db)
    }

    /// Create every table this service needs if it doesn't already exist.
    /// Enum types are created with a `DO $$ ... EXCEPTION` guard since
    /// Postgres has no `CREATE TYPE IF NOT EXISTS`.
    async fn bootstrap_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"DO $$ BEGIN
                CREATE TYPE order_side AS ENUM ('BUY', 'SELL');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"DO $$ BEGIN
                CREATE TYPE order_type AS ENUM ('MARKET', 'LIMIT');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"DO $$ BEGIN
                CREATE TYPE order_status AS ENUM
                    ('NEW', 'PARTIALLY_FILLED', 'FILLED', 'CANCELED', 'REJECTED');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"DO $$ BEGIN
                CREATE TYPE position_side AS ENUM ('LONG', 'SHORT');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                balance NUMERIC(28, 10) NOT NULL,
                leverage INT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id BIGSERIAL PRIMARY KEY,
                account_id BIGINT NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                side order_side NOT NULL,
                order_type order_type NOT NULL,
                limit_price NUMERIC(28, 10),
                avg_price NUMERIC(28, 10) NOT NULL DEFAULT 0,
                quantity NUMERIC(28, 10) NOT NULL,
                filled_quantity NUMERIC(28, 10) NOT NULL DEFAULT 0,
                leverage INT NOT NULL,
                take_profit_price NUMERIC(28, 10),
                stop_loss_price NUMERIC(28, 10),
                fee NUMERIC(28, 10) NOT NULL DEFAULT 0,
                status order_status NOT NULL DEFAULT 'NEW',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_open ON orders (status) WHERE status IN ('NEW', 'PARTIALLY_FILLED')")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_account ON orders (account_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id BIGSERIAL PRIMARY KEY,
                order_id BIGINT NOT NULL REFERENCES orders(id),
                symbol TEXT NOT NULL,
                side order_side NOT NULL,
                price NUMERIC(28, 10) NOT NULL,
                quantity NUMERIC(28, 10) NOT NULL,
                commission NUMERIC(28, 10) NOT NULL,
                executed_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id BIGSERIAL PRIMARY KEY,
                account_id BIGINT NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                quantity NUMERIC(28, 10) NOT NULL,
                entry_price NUMERIC(28, 10) NOT NULL,
                leverage INT NOT NULL,
                margin NUMERIC(28, 10) NOT NULL,
                realized_pnl NUMERIC(28, 10) NOT NULL DEFAULT 0,
                accumulated_fees NUMERIC(28, 10) NOT NULL DEFAULT 0,
                take_profit_price NUMERIC(28, 10),
                stop_loss_price NUMERIC(28, 10),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (account_id, symbol)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS position_history (
                id BIGSERIAL PRIMARY KEY,
                account_id BIGINT NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                side position_side NOT NULL,
                entry_price NUMERIC(28, 10) NOT NULL,
                exit_price NUMERIC(28, 10) NOT NULL,
                leverage INT NOT NULL,
                realized_pnl NUMERIC(28, 10) NOT NULL,
                total_fee NUMERIC(28, 10) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                closed_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_position_history_account ON position_history (account_id, closed_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equity_history (
                id BIGSERIAL PRIMARY KEY,
                account_id BIGINT NOT NULL REFERENCES accounts(id),
                equity NUMERIC(28, 10) NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_equity_history_account ON equity_history (account_id, timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

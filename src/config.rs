//! Application configuration, loaded once at startup from the environment.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

fn default_binance_ws_url() -> String {
    "wss://fstream.binance.com".to_string()
}

fn default_coinbase_ws_url() -> String {
    "wss://advanced-trade-ws.coinbase.com".to_string()
}

fn default_coinbase_api_url() -> String {
    "https://api.exchange.coinbase.com".to_string()
}

fn default_market_fee_rate() -> Decimal {
    Decimal::new(45, 5) // 0.00045
}

fn default_limit_fee_rate() -> Decimal {
    Decimal::new(18, 5) // 0.00018
}

fn default_initial_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_leverage() -> i32 {
    20
}

fn default_binance_symbols() -> Vec<String> {
    vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()]
}

fn default_coinbase_product_ids() -> Vec<String> {
    vec!["BTC-USD".into(), "ETH-USD".into(), "SOL-USD".into()]
}

fn default_engine_tick_secs() -> u64 {
    1
}

fn default_equity_interval_secs() -> u64 {
    60
}

fn default_ingester_backoff_secs() -> u64 {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,

    #[serde(default = "default_binance_ws_url")]
    pub binance_ws_url: String,
    #[serde(default = "default_coinbase_ws_url")]
    pub coinbase_ws_url: String,
    #[serde(default = "default_coinbase_api_url")]
    pub coinbase_api_url: String,

    #[serde(default = "default_market_fee_rate")]
    pub market_fee_rate: Decimal,
    #[serde(default = "default_limit_fee_rate")]
    pub limit_fee_rate: Decimal,

    #[serde(default = "default_initial_balance")]
    pub default_initial_balance: Decimal,
    #[serde(default = "default_leverage")]
    pub default_leverage: i32,

    #[serde(default = "default_binance_symbols")]
    pub binance_symbols: Vec<String>,
    #[serde(default = "default_coinbase_product_ids")]
    pub coinbase_product_ids: Vec<String>,

    #[serde(default = "default_engine_tick_secs")]
    pub engine_tick_secs: u64,
    #[serde(default = "default_equity_interval_secs")]
    pub equity_interval_secs: u64,
    #[serde(default = "default_ingester_backoff_secs")]
    pub ingester_backoff_secs: u64,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl AppConfig {
    /// Load from environment variables, optionally backed by a `.env` file.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true).list_separator(","))
            .build()?;

        let app_config: AppConfig = cfg.try_deserialize()?;
        Ok(app_config)
    }

    pub fn engine_tick_interval(&self) -> Duration {
        Duration::from_secs(self.engine_tick_secs)
    }

    pub fn equity_interval(&self) -> Duration {
        Duration::from_secs(self.equity_interval_secs)
    }

    pub fn ingester_backoff(&self) -> Duration {
        Duration::from_secs(self.ingester_backoff_secs)
    }
}

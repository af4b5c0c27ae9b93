use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod db;
mod metrics;
mod models;
mod services;
mod utils;

use crate::cache::PriceCache;
use crate::config::AppConfig;
use crate::db::Database;
use crate::services::equity_recorder::EquityRecorder;
use crate::services::ingest;
use crate::services::matching::engine::MatchingEngine;
use crate::services::notify::AccountNotifier;
use crate::services::orders::OrderSubmissionService;

pub struct AppState {
    pub config: AppConfig,
    pub db: PgPool,
    pub cache: Arc<PriceCache>,
    pub orders: Arc<OrderSubmissionService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperperps_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("starting paperperps-backend v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database_url).await?;
    tracing::info!("database connected");

    let cache = Arc::new(PriceCache::new());
    let notifier = Arc::new(AccountNotifier::new());

    let matching_engine = Arc::new(MatchingEngine::new(
        db.pool.clone(),
        cache.clone(),
        notifier.clone(),
        config.market_fee_rate,
        config.limit_fee_rate,
        config.engine_tick_interval(),
    ));
    let engine_for_loop = matching_engine.clone();
    tokio::spawn(async move {
        engine_for_loop.run().await;
    });
    tracing::info!("matching engine task spawned");

    let equity_recorder = EquityRecorder::new(db.pool.clone(), cache.clone(), config.equity_interval());
    let equity_recorder_flag = equity_recorder.running_flag();
    tokio::spawn(async move {
        equity_recorder.run().await;
    });
    tracing::info!("equity recorder task spawned");

    let ingester_handles = spawn_ingesters(&config, cache.clone());

    let orders = Arc::new(OrderSubmissionService::new(db.pool.clone(), notifier.clone()));

    let state = Arc::new(AppState {
        config: config.clone(),
        db: db.pool.clone(),
        cache,
        orders,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::routes::create_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The HTTP listener has stopped accepting connections; now clear every
    // background loop's running flag so each one exits at its next
    // iteration, per spec.md §5's shutdown contract.
    tracing::info!("stopping background tasks");
    matching_engine.stop();
    equity_recorder_flag.store(false, std::sync::atomic::Ordering::SeqCst);
    for handle in &ingester_handles {
        handle.stop();
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Each venue ingester owns its own `Arc<AtomicBool>` running flag; the
/// `IngesterHandle` itself is returned so the caller can still call
/// `.stop()` on it after its task has been spawned.
fn spawn_ingesters(config: &AppConfig, cache: Arc<PriceCache>) -> Vec<ingest::IngesterHandle> {
    let binance_handle = ingest::IngesterHandle::new();
    let binance_flag = binance_handle.flag();
    let binance_url = config.binance_ws_url.clone();
    let binance_symbols = config.binance_symbols.clone();
    let binance_cache = cache.clone();
    let binance_backoff = config.ingester_backoff();
    tokio::spawn(async move {
        ingest::binance::run(&binance_url, &binance_symbols, binance_cache, binance_flag, binance_backoff).await;
    });
    tracing::info!("Binance futures ingester task spawned");

    let coinbase_handle = ingest::IngesterHandle::new();
    let coinbase_flag = coinbase_handle.flag();
    let coinbase_url = config.coinbase_ws_url.clone();
    let coinbase_products = config.coinbase_product_ids.clone();
    let coinbase_backoff = config.ingester_backoff();
    tokio::spawn(async move {
        ingest::coinbase::run(&coinbase_url, &coinbase_products, cache, coinbase_flag, coinbase_backoff).await;
    });
    tracing::info!("Coinbase spot ingester task spawned");

    vec![binance_handle, coinbase_handle]
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::metrics::statistics::{compute_account_statistics, daily_pnl};
use crate::metrics::compute_account_metrics;
use crate::models::{
    AccountResponse, AccountStatistics, CreateAccountRequest, DailyPnl, EquityHistory, Position,
    PositionHistory, PositionResponse, UpdateAccountRequest,
};
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountResponse>>), AppError> {
    let account = state
        .orders
        .create_account(req, state.config.default_initial_balance, state.config.default_leverage)
        .await?;
    let response = account_response(&state, &account).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn update_account_settings(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.orders.update_account_settings(account_id, req).await?;
    let response = account_response(&state, &account).await?;
    Ok(Json(ApiResponse::success(response)))
}

pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.orders.get_account(account_id).await?;
    let response = account_response(&state, &account).await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn account_response(state: &AppState, account: &crate::models::Account) -> Result<AccountResponse, AppError> {
    let positions: Vec<Position> = sqlx::query_as(
        r#"
        SELECT id, account_id, symbol, quantity, entry_price, leverage, margin,
               realized_pnl, accumulated_fees, take_profit_price, stop_loss_price, created_at
        FROM positions WHERE account_id = $1
        "#,
    )
    .bind(account.id)
    .fetch_all(&state.db)
    .await?;

    let metrics = compute_account_metrics(account, &positions, &state.cache);
    let position_responses = positions
        .iter()
        .map(|p| PositionResponse::from_position(p, state.cache.get(&p.symbol)))
        .collect();

    Ok(AccountResponse {
        id: account.id,
        user_id: account.user_id.clone(),
        balance: account.balance,
        leverage: account.leverage,
        equity: metrics.equity,
        unrealized_pnl: metrics.total_unrealized_pnl,
        positions: position_responses,
    })
}

pub async fn equity_history(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<EquityHistory>>>, AppError> {
    let rows: Vec<EquityHistory> = sqlx::query_as(
        "SELECT id, account_id, equity, timestamp FROM equity_history WHERE account_id = $1 ORDER BY timestamp ASC",
    )
    .bind(account_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn position_history(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<PositionHistory>>>, AppError> {
    let rows: Vec<PositionHistory> = sqlx::query_as(
        r#"
        SELECT id, account_id, symbol, side, entry_price, exit_price, leverage, realized_pnl,
               total_fee, created_at, closed_at
        FROM position_history WHERE account_id = $1 ORDER BY closed_at DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[derive(Debug, Deserialize)]
pub struct DailyPnlQuery {
    pub year: i32,
    pub month: u32,
}

pub async fn get_daily_pnl(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
    Query(query): Query<DailyPnlQuery>,
) -> Result<Json<ApiResponse<Vec<DailyPnl>>>, AppError> {
    let history = fetch_position_history(&state, account_id).await?;
    let rows = daily_pnl(&history, query.year, query.month)
        .into_iter()
        .map(|(date, pnl)| DailyPnl { date: date.to_string(), pnl })
        .collect();
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
) -> Result<Json<ApiResponse<AccountStatistics>>, AppError> {
    let history = fetch_position_history(&state, account_id).await?;
    let equity_curve: Vec<EquityHistory> = sqlx::query_as(
        "SELECT id, account_id, equity, timestamp FROM equity_history WHERE account_id = $1 ORDER BY timestamp ASC",
    )
    .bind(account_id)
    .fetch_all(&state.db)
    .await?;

    let stats = compute_account_statistics(&history, &equity_curve);
    Ok(Json(ApiResponse::success(AccountStatistics {
        max_drawdown: stats.max_drawdown,
        max_drawdown_pct: stats.max_drawdown_pct,
        expectancy: stats.expectancy,
        profit_factor: stats.profit_factor,
        sharpe_ratio: stats.sharpe_ratio,
        cagr: stats.cagr,
        win_rate: stats.win_rate,
        total_trades: stats.total_trades,
        average_win: stats.average_win,
        average_loss: stats.average_loss,
    })))
}

async fn fetch_position_history(state: &AppState, account_id: i64) -> Result<Vec<PositionHistory>, AppError> {
    let rows = sqlx::query_as(
        r#"
        SELECT id, account_id, symbol, side, entry_price, exit_price, leverage, realized_pnl,
               total_fee, created_at, closed_at
        FROM position_history WHERE account_id = $1 ORDER BY closed_at ASC
        "#,
    )
    .bind(account_id)
    .fetch_all(&state.db)
    .await?;
    Ok(rows)
}

//! HTTP surface for the orders/positions/accounts contract. Kline
//! proxying, drawings CRUD, and a WS account-push surface are served by
//! other clients of this engine, not by this crate.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::api::handlers::{accounts, orders, positions};
use crate::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:order_id", patch(orders::amend_order).delete(orders::cancel_order))
        .route("/positions/:position_id", patch(positions::update_position_tp_sl))
        .route("/accounts/", post(accounts::create_account))
        .route(
            "/accounts/:account_id",
            get(accounts::get_account).patch(accounts::update_account_settings),
        )
        .route("/accounts/:account_id/equity-history", get(accounts::equity_history))
        .route("/accounts/:account_id/position-history", get(accounts::position_history))
        .route("/accounts/:account_id/daily-pnl", get(accounts::get_daily_pnl))
        .route("/accounts/:account_id/statistics", get(accounts::get_statistics))
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::models::{AmendOrderRequest, CreateOrderRequest, OrderResponse};
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub account_id: i64,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), AppError> {
    let order = state.orders.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order.into()))))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, AppError> {
    let orders = state.orders.list_orders(query.account_id).await?;
    let orders = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let order = state.orders.cancel_order(order_id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

pub async fn amend_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    Json(req): Json<AmendOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let order = state.orders.amend_order(order_id, req).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

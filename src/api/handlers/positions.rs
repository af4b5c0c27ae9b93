use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::models::{PositionResponse, UpdatePositionTpSlRequest};
use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

pub async fn update_position_tp_sl(
    State(state): State<Arc<AppState>>,
    Path(position_id): Path<i64>,
    Json(req): Json<UpdatePositionTpSlRequest>,
) -> Result<Json<ApiResponse<PositionResponse>>, AppError> {
    let position = state.orders.update_position_tp_sl(position_id, req).await?;
    let mark = state.cache.get(&position.symbol);
    Ok(Json(ApiResponse::success(PositionResponse::from_position(&position, mark))))
}

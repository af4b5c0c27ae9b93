pub mod accounts;
pub mod orders;
pub mod positions;

use axum::http::StatusCode;

use crate::services::orders::SubmissionError;
use crate::utils::response::AppError;

impl From<SubmissionError> for AppError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::AccountNotFound(_)
            | SubmissionError::OrderNotFound(_)
            | SubmissionError::PositionNotFound(_) => AppError::not_found(&err.to_string()),
            SubmissionError::LimitOrderRequiresPrice
            | SubmissionError::InvalidQuantity
            | SubmissionError::InvalidLeverage
            | SubmissionError::NotCancelable(_)
            | SubmissionError::NotAmendable(_) => AppError::bad_request(&err.to_string()),
            SubmissionError::Database(_) => AppError::internal(&err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", &err.to_string())
    }
}

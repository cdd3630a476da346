use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("time slot already booked")]
    SlotUnavailable,

    #[error("forbidden")]
    Forbidden,

    #[error("only pending reservations can be confirmed")]
    InvalidState,

    #[error("reservation is already cancelled")]
    AlreadyCancelled,

    #[error("reservation date has already passed")]
    PastDate,

    #[error("reservation has expired")]
    Expired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidParameter(_)
            | AppError::InvalidRange(_)
            | AppError::InvalidDuration(_)
            | AppError::InvalidState
            | AppError::AlreadyCancelled
            | AppError::PastDate
            | AppError::Expired => StatusCode::BAD_REQUEST,
            AppError::SlotUnavailable => StatusCode::CONFLICT,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

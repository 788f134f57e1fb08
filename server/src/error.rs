use axum::{Json, http::StatusCode, response::IntoResponse};
use chat::ChatError;
use response::ErrorResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Missing messages")]
    MissingInput,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("API key not configured")]
    ConfigurationMissing,

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::MissingInput | AppError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigurationMissing => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Chat(ChatError::Upstream { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Chat(ChatError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Chat(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clarify_shared::ErrorBody;

/// Failures talking to the hosted completion service.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("completion API error: {0}")]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("completion stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("upstream completion failed: {0}")]
    Gateway(#[from] GatewayError),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

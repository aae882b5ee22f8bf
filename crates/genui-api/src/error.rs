use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use genui_service::ServiceError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => match err {
                ServiceError::NotFound(_) | ServiceError::ArtifactMissing(_) => {
                    StatusCode::NOT_FOUND
                }
                ServiceError::ArtifactNotReady { .. } => StatusCode::CONFLICT,
                ServiceError::InvalidPrompt(_) | ServiceError::Config(_) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::Scheduler(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

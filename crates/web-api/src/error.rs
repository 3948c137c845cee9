use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(DomainError::InvalidArgument { field, reason }) => {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_ARGUMENT",
                    format!("{field}: {reason}"),
                )
            }
            ApplicationError::Domain(err @ DomainError::PayloadMismatch { .. }) => {
                ApiError::new(StatusCode::BAD_REQUEST, "MALFORMED_EVENT", err.to_string())
            }
            ApplicationError::NotFound { resource, id } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} {id} not found"),
            ),
            ApplicationError::Forbidden(message) => {
                ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
            }
            ApplicationError::Repository(err) => {
                error!(error = %err, "存储错误");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "database error",
                )
            }
            ApplicationError::Gate(err) => {
                error!(error = %err, "提交闸门错误");
                ApiError::internal_server_error(err.to_string())
            }
            ApplicationError::Infrastructure { message } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

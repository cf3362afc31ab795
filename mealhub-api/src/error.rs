use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mealhub_order::OrderError;
use serde_json::json;

use crate::actor::ActorError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UnprocessableError(String),
    UpstreamError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream provider failure: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let msg = err.to_string();
        match err {
            OrderError::NotFound(_)
            | OrderError::MerchantNotFound(_)
            | OrderError::UnknownAuthorization(_) => AppError::NotFoundError(msg),
            OrderError::Forbidden(_) => AppError::AuthorizationError(msg),
            OrderError::InvalidTransition { .. }
            | OrderError::NotModifiable { .. }
            | OrderError::PersistenceConflict(_) => AppError::ConflictError(msg),
            OrderError::InvalidSchedule(_)
            | OrderError::Validation(_)
            | OrderError::UntrustedEvent(_) => AppError::ValidationError(msg),
            OrderError::InvalidDistance(_) => AppError::UnprocessableError(msg),
            OrderError::GeolocationUnavailable(_) | OrderError::PaymentProvider(_) => {
                AppError::UpstreamError(msg)
            }
            OrderError::Persistence(_) | OrderError::Catalog(_) => {
                AppError::InternalServerError(msg)
            }
        }
    }
}

impl From<ActorError> for AppError {
    fn from(err: ActorError) -> Self {
        AppError::AuthenticationError(err.to_string())
    }
}

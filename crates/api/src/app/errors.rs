use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use garrison_auth::AuthzError;
use garrison_infra::EngineError;

/// Failure of a request after authentication succeeded.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::Forbidden(err) => json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
            ApiError::Worker(msg) => {
                tracing::error!(error = %msg, "request worker failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        }
    }
}

pub fn engine_error_to_response(err: EngineError) -> Response {
    let message = err.to_string();
    match err {
        EngineError::Validation(_) => json_error(StatusCode::BAD_REQUEST, err.code(), message),
        EngineError::AccessDenied(_) => json_error(StatusCode::FORBIDDEN, err.code(), message),
        EngineError::NotFound(_) => json_error(StatusCode::NOT_FOUND, err.code(), message),
        EngineError::InsufficientStock { requested, available } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        EngineError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, err.code(), message)
        }
        EngineError::TransactionFailed(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, err.code(), message)
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::validation("bad"), StatusCode::BAD_REQUEST),
            (EngineError::access_denied("no"), StatusCode::FORBIDDEN),
            (EngineError::not_found("asset"), StatusCode::NOT_FOUND),
            (
                EngineError::InsufficientStock { requested: 5, available: 2 },
                StatusCode::CONFLICT,
            ),
            (EngineError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (EngineError::TransactionFailed("db".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}

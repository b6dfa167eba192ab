//! Error mapping at the HTTP boundary.
//!
//! Every failure leaves as `{code, message}` with the status the engine's
//! taxonomy dictates. Internal errors are logged here and surfaced as an
//! opaque message; no stack traces cross the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fcfs_engine::EngineError;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: "missing or malformed bearer credential".to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION",
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: "resource not found".to_string(),
        }
    }

    pub fn internal(context: &str) -> Self {
        error!(context, "internal error at http boundary");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL",
            message: "internal error".to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound => StatusCode::NOT_FOUND,
            EngineError::AlreadyClaimed
            | EngineError::SlotNotClaimed
            | EngineError::AlreadyCancelled
            | EngineError::AlreadyCompleted
            | EngineError::CancelFailed => StatusCode::CONFLICT,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &e {
            EngineError::Internal(err) => {
                error!(error = %err, "engine internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        Self {
            status,
            code: e.code(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                code: self.code.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_contract_status_codes() {
        let cases = [
            (EngineError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::NotFound, StatusCode::NOT_FOUND),
            (EngineError::AlreadyClaimed, StatusCode::CONFLICT),
            (EngineError::SlotNotClaimed, StatusCode::CONFLICT),
            (EngineError::AlreadyCancelled, StatusCode::CONFLICT),
            (EngineError::AlreadyCompleted, StatusCode::CONFLICT),
            (EngineError::CancelFailed, StatusCode::CONFLICT),
        ];
        for (err, want) in cases {
            let code = err.code();
            let api: ApiError = err.into();
            assert_eq!(api.status, want);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let api: ApiError = EngineError::Internal(anyhow::anyhow!("pg password wrong")).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "internal error");
    }
}

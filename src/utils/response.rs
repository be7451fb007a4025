//! Shared HTTP response envelope and error mapping for `crate::api`.
//!
//! Grounded on the originating service's `utils::response::{ApiResponse,
//! AppError}` — same success/error envelope shape and `IntoResponse` impl,
//! adapted here to translate `crate::errors::ErrorKind` into a status code
//! instead of being constructed ad hoc per handler.

#![allow(dead_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{EngineError, ErrorKind};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// HTTP-facing error: a status code plus a stable code/message pair.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                code: self.code,
                message: self.message,
            }),
            timestamp: chrono::Utc::now().timestamp(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps the crate-wide error taxonomy onto HTTP status codes for the
/// façade's handlers.
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match err.kind() {
            ErrorKind::InvalidInput | ErrorKind::UnknownSymbol => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::RiskRejected | ErrorKind::SelfTrading => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InsufficientBalance => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Terminal => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, kind_code(err.kind()), err.to_string())
    }
}

fn kind_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidInput => "INVALID_INPUT",
        ErrorKind::UnknownSymbol => "UNKNOWN_SYMBOL",
        ErrorKind::RateLimited => "RATE_LIMITED",
        ErrorKind::RiskRejected => "RISK_REJECTED",
        ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
        ErrorKind::SelfTrading => "SELF_TRADING",
        ErrorKind::NotFound => "NOT_FOUND",
        ErrorKind::Terminal => "TERMINAL",
        ErrorKind::Forbidden => "FORBIDDEN",
        ErrorKind::Internal => "INTERNAL_ERROR",
    }
}

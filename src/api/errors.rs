//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.
//! Session outcomes carry their stable reason string as the error code;
//! fraud types and severities never appear in a response.

use crate::errors::GameError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-checkable code
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
    /// Overrides the kind's generic code
    pub code: Option<&'static str>,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    PaymentRequired(String),
    Forbidden(String),
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn new(kind: ApiErrorKind, request_id: String) -> Self {
        Self {
            kind,
            request_id,
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::NotFound(message), request_id)
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::BadRequest(message), request_id)
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::Unauthorized(message), request_id)
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::ServiceUnavailable(message), request_id)
    }

    /// Malformed or unparseable request body
    pub fn invalid_body(request_id: String, rejection: JsonRejection) -> Self {
        Self::bad_request(request_id, rejection.body_text()).with_code("invalid_request")
    }

    pub fn from_game(request_id: String, error: GameError) -> Self {
        let message = error.to_string();
        let kind = match &error {
            GameError::SessionNotFound => ApiErrorKind::NotFound(message),
            GameError::SessionNotActive | GameError::ActiveSessionExists => {
                ApiErrorKind::Conflict(message)
            }
            GameError::InvalidBetAmount { .. }
            | GameError::PositionMismatch
            | GameError::MaxCoinsExceeded
            | GameError::TooFastCollection
            | GameError::CoinMismatch
            | GameError::TooShortGame => ApiErrorKind::BadRequest(message),
            GameError::AccountSuspicious => ApiErrorKind::Forbidden(
                "Account flagged for suspicious activity. Please contact support.".to_string(),
            ),
            GameError::InvalidToken => {
                ApiErrorKind::Unauthorized("Invalid or expired token".to_string())
            }
            GameError::InsufficientFunds(_) => ApiErrorKind::PaymentRequired(message),
            GameError::WalletUnavailable(_) => ApiErrorKind::ServiceUnavailable(message),
            GameError::Storage(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Storage failure");
                ApiErrorKind::InternalError("Internal error".to_string())
            }
        };
        Self::new(kind, request_id).with_code(error.reason())
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiErrorKind::PaymentRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED", msg)
            }
            ApiErrorKind::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (status, _, message) = self.parts();
        write!(f, "[{}] {}: {}", self.request_id, status, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, default_code, message) = self.parts();

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: self.code.unwrap_or(default_code).to_string(),
                message: message.to_string(),
                details: None,
            },
        });

        (status, body).into_response()
    }
}

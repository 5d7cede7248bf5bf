//! Unified application error model and mapping helpers.
//! This module provides the common error enum used across the HTTP surface
//! and the auth/navigation components, along with the JSON error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Missing, invalid or expired credential.
    Authentication { code: String, message: String },
    /// Known caller, but not permitted: not on the allowlist, not the owner.
    Authorization { code: String, message: String },
    /// Missing or malformed request parameter.
    Validation { code: String, message: String },
    NotFound { code: String, message: String },
    /// Identity provider, datastore or composer failure. Details are logged
    /// server-side; callers only see a generic message.
    Upstream { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Authentication { code, .. }
            | AppError::Authorization { code, .. }
            | AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Upstream { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Authentication { message, .. }
            | AppError::Authorization { message, .. }
            | AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Upstream { message, .. } => message.as_str(),
        }
    }

    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authentication { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authorization { code: code.into(), message: msg.into() } }
    pub fn invalid<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Authentication { .. } => 401,
            AppError::Authorization { .. } => 403,
            AppError::Validation { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Upstream { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Upstream { code: "upstream".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Upstream details stay in the server log; the envelope carries a generic message.
        let message = if let AppError::Upstream { code, message } = &self {
            tracing::error!(code = code.as_str(), "upstream failure: {}", message);
            "internal error"
        } else {
            self.message()
        };
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ReauthenticationRequired,
    TemporarilyUnavailable,
    StorageError,
    ConfigurationError,
    Unauthorized,
    BadRequest,
    UpstreamError,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ReauthenticationRequired => 401,
            Self::TemporarilyUnavailable => 503,
            Self::StorageError => 500,
            Self::ConfigurationError => 500,
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReauthenticationRequired => "REAUTHENTICATION_REQUIRED",
            Self::TemporarilyUnavailable => "TEMPORARILY_UNAVAILABLE",
            Self::StorageError => "STORAGE_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Failure returned to anything that asked for a credential.
///
/// Cloneable so every caller attached to one in-flight refresh receives
/// the same failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Required OAuth settings are missing. Not retried.
    Configuration(String),
    /// No usable credential; the user must run the authorization flow again.
    ReauthenticationRequired(String),
    /// The issuer could not be reached or failed transiently. Safe to retry.
    TemporarilyUnavailable(String),
    /// A credential could not be persisted.
    Storage(String),
    /// The caller supplied an invalid request (e.g. unknown OAuth state).
    BadRequest(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::ConfigurationError,
            Self::ReauthenticationRequired(_) => ErrorCode::ReauthenticationRequired,
            Self::TemporarilyUnavailable(_) => ErrorCode::TemporarilyUnavailable,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::BadRequest(_) => ErrorCode::BadRequest,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(m)
            | Self::ReauthenticationRequired(m)
            | Self::TemporarilyUnavailable(m)
            | Self::Storage(m)
            | Self::BadRequest(m) => m,
        }
    }

    pub fn is_reauthentication_required(&self) -> bool {
        matches!(self, Self::ReauthenticationRequired(_))
    }

    pub fn is_temporarily_unavailable(&self) -> bool {
        matches!(self, Self::TemporarilyUnavailable(_))
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        self.code().to_http_response(self.message())
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

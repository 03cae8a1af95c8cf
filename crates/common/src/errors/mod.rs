//! Error types for Spurgeon services
//!
//! Provides a closed error taxonomy with:
//! - An explicit kind discriminant for every failure mode
//! - HTTP status code mapping as a total match
//! - Structured `{status, error, details}` response bodies

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Status used when an upstream provider failed without giving one
pub const DEFAULT_UPSTREAM_STATUS: u16 = 502;

/// Machine-readable error kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing caller input
    Validation,
    /// Missing passcode or wrong passcode
    Unauthorized,
    /// Unknown route-level resource (e.g. tool name)
    NotFound,
    /// Deployment defect: missing env var or local file
    Configuration,
    /// Non-success, empty or malformed response from a provider
    ExternalApi,
    /// Anything unexpected; never leaks details
    Internal,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, status: Option<u16> },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Configuration { message: String },

    #[error("{message}")]
    ExternalApi {
        message: String,
        status: Option<u16>,
        details: Option<Value>,
    },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Validation failure with the default 400 status
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            status: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    /// Provider failure; `status` of `None` renders as 502
    pub fn external(message: impl Into<String>, status: Option<u16>, details: Option<Value>) -> Self {
        AppError::ExternalApi {
            message: message.into(),
            status,
            details,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            message: message.into(),
        }
    }

    /// Get the kind discriminant for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. } => ErrorKind::Validation,
            AppError::Unauthorized { .. } => ErrorKind::Unauthorized,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Configuration { .. } => ErrorKind::Configuration,
            AppError::ExternalApi { .. } => ErrorKind::ExternalApi,
            AppError::Internal { .. } | AppError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_REQUEST),
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::ExternalApi { status, .. } => StatusCode::from_u16(
                status.filter(|s| *s >= 400).unwrap_or(DEFAULT_UPSTREAM_STATUS),
            )
            .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::Configuration { .. } | AppError::Internal { .. } | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Upstream diagnostic payload, only carried by provider failures
    pub fn details(&self) -> Option<&Value> {
        match self {
            AppError::ExternalApi { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Build the caller-facing body. Unclassified errors never expose their message.
    pub fn to_error_body(&self) -> ErrorBody {
        let status = self.status_code().as_u16();
        let error = match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        ErrorBody {
            status,
            error,
            details: self.details().cloned(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                kind = ?kind,
                status = status.as_u16(),
                details = ?self.details(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                kind = ?kind,
                status = status.as_u16(),
                "Client error"
            );
        }

        (status, Json(self.to_error_body())).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApi {
            message: format!("HTTP request failed: {}", err),
            status: err.status().map(|s| s.as_u16()),
            details: None,
        }
    }
}

impl AppError {
    /// Validation error carrying one field message. Fields named in `order` are
    /// reported first, in that order; any others follow by name.
    pub fn from_validation(err: validator::ValidationErrors, order: &[&str]) -> Self {
        let mut fields: Vec<(usize, String, String)> = err
            .field_errors()
            .iter()
            .filter_map(|(field, errors)| {
                let message = errors.iter().find_map(|e| e.message.as_ref())?.to_string();
                let field = field.to_string();
                let rank = order.iter().position(|f| *f == field).unwrap_or(order.len());
                Some((rank, field, message))
            })
            .collect();
        fields.sort();

        let message = fields
            .into_iter()
            .next()
            .map(|(_, _, message)| message)
            .unwrap_or_else(|| err.to_string());
        AppError::validation(message)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::from_validation(err, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("Question is required.");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_external_status_defaults_to_bad_gateway() {
        let err = AppError::external("No text returned from model.", None, None);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = AppError::external("OpenAI responses failed (429)", Some(429), None);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_configuration_is_server_error() {
        let err = AppError::configuration("Missing env vars: OPENAI_API_KEY");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_error_body().error, "Missing env vars: OPENAI_API_KEY");
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = AppError::Internal {
            message: "secret connection string".to_string(),
        };
        let body = err.to_error_body();
        assert_eq!(body.status, 500);
        assert_eq!(body.error, "Internal server error");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_external_body_carries_details() {
        let err = AppError::external(
            "OpenAI embeddings failed (500)",
            Some(500),
            Some(json!({ "body": "upstream exploded" })),
        );
        let body = err.to_error_body();
        assert_eq!(body.status, 500);
        assert_eq!(body.details, Some(json!({ "body": "upstream exploded" })));
    }

    #[derive(validator::Validate)]
    struct Form {
        #[validate(length(min = 1, message = "Name is required."))]
        name: String,
        #[validate(range(min = 1, message = "Age must be positive."))]
        age: i64,
        #[validate(range(min = 0, message = "Balance must not be negative."))]
        balance: i64,
    }

    #[test]
    fn test_validation_message_follows_field_order() {
        use validator::Validate;

        let form = Form { name: String::new(), age: 0, balance: -1 };
        for _ in 0..50 {
            let err = AppError::from_validation(form.validate().unwrap_err(), &["name", "age", "balance"]);
            assert_eq!(err.to_string(), "Name is required.");
        }

        let form = Form { name: "n".to_string(), age: 0, balance: -1 };
        let err = AppError::from_validation(form.validate().unwrap_err(), &["name", "age", "balance"]);
        assert_eq!(err.to_string(), "Age must be positive.");

        // Unordered fields fall back to name order
        let err: AppError = form.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Age must be positive.");
    }

    #[tokio::test]
    async fn test_into_response_shape() {
        let response = AppError::validation("Message is required.").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "status": 400, "error": "Message is required." }));
    }
}

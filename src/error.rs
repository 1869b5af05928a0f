//! Error types for Aventra
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` so handlers can return them directly.
//! The response body has the same shape as a failed [`ActionResult`].
//!
//! [`ActionResult`]: crate::api::ActionResult

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::identity::IdentityError;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Form input failed validation (400)
    ///
    /// Carries the message of the first failing rule.
    #[error("{0}")]
    Validation(String),

    /// The identity service refused the operation (401)
    ///
    /// Carries a user-facing message; the backend detail is only logged.
    #[error("{0}")]
    Rejected(String),

    /// Request is missing something the server needs (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Authenticated, but the resource belongs to someone else (403)
    #[error("{0}")]
    Forbidden(String),

    /// Identity service could not serve a request (502)
    #[error("Identity service error: {0}")]
    Identity(IdentityError),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Rejected(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), "rejected"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "bad_request"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), "forbidden"),
            AppError::Identity(_) => (
                StatusCode::BAD_GATEWAY,
                "Identity service unavailable".to_string(),
                "identity",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        }
    }

    /// The message shown to the user for this error
    pub fn user_message(&self) -> String {
        self.parts().1
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to an HTTP status code and a
    /// `{"success": false, "error": ...}` JSON body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = self.parts();

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

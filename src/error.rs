use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// Rejected user input (mismatched passwords, duplicate username, bad role...).
    #[error("{0}")]
    Validation(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error should be shown to the user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Validation(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(error = %self, "Request error");

        if status.is_server_error() {
            (status, "Internal server error").into_response()
        } else {
            (status, self.to_string()).into_response()
        }
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;

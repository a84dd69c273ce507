// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("No live connection for user {user_id}")]
    StaleTarget { user_id: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MeetingNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            AppError::StaleTarget { .. } => StatusCode::GONE,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MeetingNotFound(_) => "MEET_001",
            AppError::MalformedMessage(_) => "MSG_001",
            AppError::StaleTarget { .. } => "MSG_002",
            AppError::Config(_) => "CFG_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::MeetingNotFound(_) => "Meeting not found".to_string(),
            AppError::MalformedMessage(_) => "Invalid request format".to_string(),
            AppError::StaleTarget { .. } => "Recipient is not connected".to_string(),
            AppError::Config(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Browser clients match on this exact body
        if let AppError::MeetingNotFound(_) = self {
            let body = serde_json::json!({ "message": "Meeting not found" });
            return (status, axum::Json(body)).into_response();
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

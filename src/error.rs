//! # Error Handling
//!
//! This module defines the error taxonomy of the transcription service and how each
//! kind of failure is turned into an HTTP response.
//!
//! ## Error Families:
//! - **Client input**: `Validation`, `Decode` (the caller sent something we cannot use)
//! - **Upstream / delivery**: `Download`, `Upload` (a remote server misbehaved)
//! - **Processing**: `Transcription` (the speech model failed)
//! - **Lookup**: `NotFound`, `Conflict` (job ids and job state)
//! - **Server**: `Config`, `Internal`
//!
//! ## Async vs sync:
//! On the synchronous path these errors become request failures directly.
//! On the asynchronous path the job runner renders them with `Display` and stores the
//! text in the job's `error` field; they never reach an HTTP layer with no listener.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Every failure the service can report.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::Validation("Must provide audio_base64 or audio_url".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Bad or missing input, rejected before any job is created
    Validation(String),

    /// Inline audio payload was not valid base64
    Decode(String),

    /// Audio source could not be fetched (bad status, timeout, transport error)
    Download(String),

    /// The transcriber collaborator failed
    Transcription(String),

    /// Result could not be delivered to the upload destination
    Upload(String),

    /// Requested job (or job result) does not exist
    NotFound(String),

    /// The job exists but is not in a state that allows the request
    Conflict(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// Anything else that went wrong on our side
    Internal(String),
}

impl AppError {
    /// Machine-readable error type used in JSON bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Decode(_) => "decode_error",
            AppError::Download(_) => "download_error",
            AppError::Transcription(_) => "transcription_error",
            AppError::Upload(_) => "upload_error",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// The bare message, without the category prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            AppError::Validation(msg)
            | AppError::Decode(msg)
            | AppError::Download(msg)
            | AppError::Transcription(msg)
            | AppError::Upload(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Config(msg)
            | AppError::Internal(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Decode(msg) => write!(f, "Decode error: {}", msg),
            AppError::Download(msg) => write!(f, "Download error: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription error: {}", msg),
            AppError::Upload(msg) => write!(f, "Upload error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - Validation/Decode → 400 (the caller must fix the request)
/// - NotFound → 404
/// - Conflict → 409
/// - Download/Upload → 502 (a remote server failed us)
/// - Transcription/Config/Internal → 500
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "download_error",
///     "message": "HTTP 403 Forbidden",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Decode(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Download(_) | AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::Transcription(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing failures are almost always the client's fault, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

//! Error types for MentorHub services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for scheduling, lifecycle and payment failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidReference,

    // Authentication errors (2xxx)
    Unauthorized,
    ExpiredToken,

    // Authorization errors (3xxx)
    Forbidden,

    // Resource errors (4xxx)
    NotFound,

    // Conflict errors (5xxx)
    Conflict,
    SlotConflict,
    InvalidStateTransition,

    // Scheduling errors (6xxx)
    SlotBlocked,
    SlotOutsideAvailability,
    CancellationWindowClosed,

    // Payment errors (7xxx)
    PaymentWindowExpired,
    InvalidPaymentSignature,
    PaymentNotSettled,
    WrongPaymentMode,
    UpstreamPaymentFailure,

    // Rate limiting (8xxx)
    RateLimited,

    // Internal errors (9xxx)
    DatabaseError,
    ConnectionError,
    UpstreamError,
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidReference => 1002,

            ErrorCode::Unauthorized => 2001,
            ErrorCode::ExpiredToken => 2002,

            ErrorCode::Forbidden => 3001,

            ErrorCode::NotFound => 4001,

            ErrorCode::Conflict => 5001,
            ErrorCode::SlotConflict => 5002,
            ErrorCode::InvalidStateTransition => 5003,

            ErrorCode::SlotBlocked => 6001,
            ErrorCode::SlotOutsideAvailability => 6002,
            ErrorCode::CancellationWindowClosed => 6003,

            ErrorCode::PaymentWindowExpired => 7001,
            ErrorCode::InvalidPaymentSignature => 7002,
            ErrorCode::PaymentNotSettled => 7003,
            ErrorCode::WrongPaymentMode => 7004,
            ErrorCode::UpstreamPaymentFailure => 7005,

            ErrorCode::RateLimited => 8001,

            ErrorCode::DatabaseError => 9001,
            ErrorCode::ConnectionError => 9002,
            ErrorCode::UpstreamError => 9003,
            ErrorCode::InternalError => 9004,
            ErrorCode::ConfigurationError => 9005,
            ErrorCode::SerializationError => 9006,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid {kind} id: {value}")]
    InvalidReference { kind: &'static str, value: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("{resource_type} not found: {id}")]
    NotFound { resource_type: &'static str, id: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    #[error("This slot is already booked")]
    SlotConflict,

    #[error("Cannot {action} a session in status '{status}'")]
    InvalidStateTransition { action: &'static str, status: String },

    // Scheduling errors
    #[error("Mentor is unavailable on {date}")]
    SlotBlocked { date: String },

    #[error("Selected time is outside mentor availability")]
    SlotOutsideAvailability,

    #[error("Students can cancel only at least {cutoff_minutes} minutes before the session")]
    CancellationWindowClosed { cutoff_minutes: i64 },

    // Payment errors
    #[error("Payment window expired. Please book again.")]
    PaymentWindowExpired,

    #[error("Invalid payment signature")]
    InvalidPaymentSignature,

    #[error("Meeting link can be set only for confirmed paid sessions")]
    PaymentNotSettled,

    #[error("Session is not in {expected} payment mode")]
    WrongPaymentMode { expected: &'static str },

    #[error("Payment gateway error: {reason}")]
    UpstreamPaymentFailure { status: Option<u16>, reason: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation failure without a field
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidReference { .. } => ErrorCode::InvalidReference,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::SlotConflict => ErrorCode::SlotConflict,
            AppError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            AppError::SlotBlocked { .. } => ErrorCode::SlotBlocked,
            AppError::SlotOutsideAvailability => ErrorCode::SlotOutsideAvailability,
            AppError::CancellationWindowClosed { .. } => ErrorCode::CancellationWindowClosed,
            AppError::PaymentWindowExpired => ErrorCode::PaymentWindowExpired,
            AppError::InvalidPaymentSignature => ErrorCode::InvalidPaymentSignature,
            AppError::PaymentNotSettled => ErrorCode::PaymentNotSettled,
            AppError::WrongPaymentMode { .. } => ErrorCode::WrongPaymentMode,
            AppError::UpstreamPaymentFailure { .. } => ErrorCode::UpstreamPaymentFailure,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::InvalidReference { .. }
            | AppError::SlotBlocked { .. }
            | AppError::SlotOutsideAvailability
            | AppError::CancellationWindowClosed { .. }
            | AppError::PaymentWindowExpired
            | AppError::InvalidPaymentSignature
            | AppError::PaymentNotSettled
            | AppError::WrongPaymentMode { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Duplicate { .. }
            | AppError::SlotConflict
            | AppError::InvalidStateTransition { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::UpstreamPaymentFailure { .. } | AppError::HttpClient(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
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
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                numeric_code: code.as_code(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

/// Parse an id taken from a path or body, naming what it refers to
pub fn parse_reference(kind: &'static str, raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|_| AppError::InvalidReference {
        kind,
        value: raw.to_string(),
    })
}

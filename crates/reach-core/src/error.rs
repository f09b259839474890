//! Unified error handling for Reach
//!
//! One error type for the whole engine, with automatic HTTP response
//! mapping for the API layer. Per-recipient gateway failures are caught by
//! the dispatcher and recorded on the message row; they only surface as
//! `AppError` for single-recipient operations (test sends, media upload).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Dispatch Errors ====================
    #[error("No eligible recipients for the given filter")]
    NoEligibleRecipients,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Send window closed, next eligible at {next_available}")]
    SendWindowClosed { next_available: DateTime<Utc> },

    #[error("Daily test send quota exceeded: limit {limit}")]
    TestQuotaExceeded { limit: i32 },

    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("Campaign is not cancellable: {0}")]
    NotCancellable(String),

    #[error("Wallet not found for account: {0}")]
    WalletNotFound(String),

    #[error("Reservation not found for campaign: {0}")]
    ReservationNotFound(String),

    #[error("Reservation failed: {0}")]
    ReservationFailed(String),

    // ==================== Gateway Errors ====================
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery status unavailable: {0}")]
    StatusUnavailable(String),

    #[error("Media rejected by gateway: {0}")]
    MediaRejected(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::MissingField(_)
            | AppError::NoEligibleRecipients
            | AppError::NotCancellable(_)
            | AppError::SendWindowClosed { .. }
            | AppError::InvalidRecipient(_)
            | AppError::MediaRejected(_) => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            // 404 Not Found
            AppError::CampaignNotFound(_)
            | AppError::WalletNotFound(_)
            | AppError::ReservationNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::TestQuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            AppError::GatewayUnavailable(_) | AppError::StatusUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::NoEligibleRecipients => "no_eligible_recipients",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::SendWindowClosed { .. } => "send_window_closed",
            AppError::TestQuotaExceeded { .. } => "test_quota_exceeded",
            AppError::CampaignNotFound(_) => "campaign_not_found",
            AppError::NotCancellable(_) => "not_cancellable",
            AppError::WalletNotFound(_) => "wallet_not_found",
            AppError::ReservationNotFound(_) => "reservation_not_found",
            AppError::ReservationFailed(_) => "reservation_failed",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::InvalidRecipient(_) => "invalid_recipient",
            AppError::StatusUnavailable(_) => "status_unavailable",
            AppError::MediaRejected(_) => "media_rejected",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        // Structured detail for errors the caller acts on programmatically
        match self {
            AppError::InsufficientBalance {
                required,
                available,
            } => {
                body["required"] = json!(required);
                body["available"] = json!(available);
            }
            AppError::SendWindowClosed { next_available } => {
                body["next_available"] = json!(next_available);
            }
            AppError::TestQuotaExceeded { limit } => {
                body["limit"] = json!(limit);
            }
            _ => {}
        }

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

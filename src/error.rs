use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Caller-input validation failure on a monetary amount. Always recoverable
/// by correcting the input; never retried automatically.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount must be positive")]
    NotPositive,
    #[error("Amount must be at least {0} yen")]
    BelowMinimum(i64),
    #[error("Amount cannot exceed {0} yen")]
    AboveMaximum(i64),
    #[error("Donation amount must be at least {0} yen")]
    BelowDonationMinimum(i64),
    #[error("Donation amount cannot exceed {0} yen")]
    AboveDonationMaximum(i64),
}

/// Settings-write validation failure. All-or-nothing: no partial writes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("tenantId is required")]
    TenantRequired,
    #[error("Annual fee amount cannot be negative")]
    NegativeAnnualFee,
    #[error("Annual fee amount cannot exceed {0} yen")]
    AnnualFeeTooLarge(i64),
    #[error("Donation minimum amount must be greater than 0")]
    NonPositiveDonationMin,
    #[error("Donation minimum amount cannot be greater than maximum amount")]
    MinAboveMax,
    #[error("Donation preset {preset} is outside the allowed range ({min} - {max})")]
    PresetOutOfRange { preset: i64, min: i64, max: i64 },
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
    #[error("Tenant not found")]
    TenantNotFound,
    #[error("Invalid session id")]
    InvalidSessionId,
    /// Stable wrapper for provider failures. The raw Stripe error is logged
    /// where it occurs, never surfaced to callers.
    #[error("Failed to create checkout session")]
    Provider,
}

/// Webhook authentication failure only. Always a 400; business-logic
/// problems inside a handled event are not WebhookErrors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,
    #[error("Malformed signature header")]
    MalformedSignature,
    #[error("Signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("Invalid webhook signature")]
    BadSignature,
    #[error("Invalid event payload")]
    BadPayload,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Amount(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::Settings(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::Checkout(CheckoutError::TenantNotFound) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Checkout(CheckoutError::Provider) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Checkout(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::Webhook(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

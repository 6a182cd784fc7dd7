//! Unified error handling for the rating engine
//!
//! This module provides the error type shared by the rating, balance and
//! scheduling layers, together with stable machine-readable error codes.

use thiserror::Error;

/// Main application error type
///
/// All errors in the engine are converted to this type. Storage adapters map
/// their backend failures into `Storage`/`StorageConnection`; the engine adds
/// the destination or profile key where it has one.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Storage Errors ====================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    // ==================== Lookup Errors ====================
    #[error("Rating profile not found: {0}")]
    RatingProfileNotFound(String),

    #[error("Destination not found: {0}")]
    DestinationNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Actions not found: {0}")]
    ActionsNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ==================== Balance Errors ====================
    #[error("Amount too big: requested {requested}, available {available}")]
    AmountTooBig { requested: String, available: String },

    #[error("No credit left for account: {0}")]
    NoCredit(String),

    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    // ==================== Tariff Errors ====================
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Malformed calendar field {field}: {value}")]
    MalformedCalendarField { field: String, value: String },

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Shorthand for a malformed calendar field
    pub fn malformed(field: &str, value: impl ToString) -> Self {
        AppError::MalformedCalendarField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Returns true for every member of the not-found family
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::RatingProfileNotFound(_)
                | AppError::DestinationNotFound(_)
                | AppError::AccountNotFound(_)
                | AppError::ActionsNotFound(_)
                | AppError::NotFound(_)
        )
    }

    /// Returns the error code for logs and callers
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Storage(_) => "storage_error",
            AppError::StorageConnection(_) => "storage_connection_error",
            AppError::RatingProfileNotFound(_) => "rating_profile_not_found",
            AppError::DestinationNotFound(_) => "destination_not_found",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::ActionsNotFound(_) => "actions_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::AmountTooBig { .. } => "amount_too_big",
            AppError::NoCredit(_) => "no_credit",
            AppError::AccountDisabled(_) => "account_disabled",
            AppError::UnsupportedAction(_) => "unsupported_action",
            AppError::MalformedCalendarField { .. } => "malformed_calendar_field",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
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

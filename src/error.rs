//! Error taxonomy for the confirmation core
//!
//! Every failure a user can see maps to one of these types, each with a
//! stable error code for client handling and a user-facing message.
//! Expected outcomes (no quote route, incorrect PIN, soft timeout) are not
//! errors and live on the result types of their components instead.

use crate::backend::error::BackendError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GENERIC_SUBMISSION_MESSAGE: &str =
    "We couldn't submit your transaction. Please try again";

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "INVALID_PAYMENT_CODE")]
    InvalidPaymentCode,
    #[serde(rename = "INSUFFICIENT_BALANCE")]
    InsufficientBalance,
    #[serde(rename = "AMOUNT_LOCKED")]
    AmountLocked,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "QUOTE_UNAVAILABLE")]
    QuoteUnavailable,
    #[serde(rename = "SUBMISSION_IN_PROGRESS")]
    SubmissionInProgress,
    #[serde(rename = "FLOW_FINISHED")]
    FlowFinished,
    #[serde(rename = "NO_ACTIVE_INTENT")]
    NoActiveIntent,
    #[serde(rename = "PIN_ATTEMPTS_EXHAUSTED")]
    PinAttemptsExhausted,
    #[serde(rename = "PIN_VERIFICATION_ERROR")]
    PinVerificationError,
    #[serde(rename = "PIN_CANCELLED")]
    PinCancelled,
    #[serde(rename = "TRANSACTION_SUBMISSION_FAILED")]
    TransactionSubmissionFailed,
    #[serde(rename = "TRANSACTION_FAILED")]
    TransactionFailed,
    #[serde(rename = "STATUS_CHECK_FAILED")]
    StatusCheckFailed,
    #[serde(rename = "FLOW_ABANDONED")]
    FlowAbandoned,
}

/// Malformed or disallowed payment code. Blocks draft creation entirely.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidCodeError {
    #[error("payment code is empty")]
    Empty,

    #[error("malformed payment code: {reason}")]
    Malformed { reason: String },

    #[error("checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("payment code is missing required field '{field}'")]
    MissingField { field: String },

    #[error("merchant category {category} is not accepted")]
    CategoryNotAllowed { category: String },

    #[error("unsupported currency {currency}")]
    UnsupportedCurrency { currency: String },

    #[error("invalid amount '{amount}'")]
    InvalidAmount { amount: String },

    #[error("payment code has no recognised merchant account")]
    UnknownScheme,

    #[error("payment code rejected: {}", message.as_deref().unwrap_or("no reason given"))]
    RejectedByPreview { message: Option<String> },
}

impl InvalidCodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            InvalidCodeError::CategoryNotAllowed { .. } => {
                "Payments to this type of merchant are not supported".to_string()
            }
            InvalidCodeError::UnsupportedCurrency { currency } => {
                format!("Payments in currency {} are not supported", currency)
            }
            InvalidCodeError::RejectedByPreview {
                message: Some(message),
            } if !message.trim().is_empty() => message.clone(),
            _ => "This payment code is invalid. Please scan it again".to_string(),
        }
    }
}

/// Local validation failure raised before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("insufficient {asset} balance: available {available}, required {required}")]
pub struct InsufficientBalanceError {
    pub asset: String,
    pub available: Decimal,
    pub required: Decimal,
}

/// Backend or transport failure while submitting. Safe to retry because the
/// idempotency key of the intent is stable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transaction submission failed: {message}")]
pub struct TransactionSubmissionError {
    pub message: String,
    pub retryable: bool,
}

impl TransactionSubmissionError {
    pub fn from_backend(err: &BackendError) -> Self {
        Self {
            message: err
                .backend_message()
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_SUBMISSION_MESSAGE.to_string()),
            retryable: err.is_retryable(),
        }
    }
}

impl From<BackendError> for TransactionSubmissionError {
    fn from(err: BackendError) -> Self {
        Self::from_backend(&err)
    }
}

/// Unified error for everything the confirmation flow can surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    #[error(transparent)]
    InvalidCode(#[from] InvalidCodeError),

    #[error(transparent)]
    InsufficientBalance(#[from] InsufficientBalanceError),

    #[error("requested amount is fixed by the payment code")]
    AmountLocked,

    #[error("invalid requested amount {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("no quote is available for the selected asset")]
    QuoteUnavailable,

    #[error("a submission is already in progress")]
    InProgress,

    #[error("flow has already finished")]
    FlowFinished,

    #[error("no confirmed transaction intent to submit")]
    NoActiveIntent,

    #[error("PIN attempts exhausted after {attempts} tries")]
    PinAttemptsExhausted { attempts: u32 },

    #[error("PIN verification failed: {message}")]
    PinVerification { message: String },

    #[error("PIN entry cancelled")]
    PinCancelled,

    #[error(transparent)]
    Submission(#[from] TransactionSubmissionError),

    #[error("transaction {transaction_id} failed with status {status}")]
    TransactionFailed {
        transaction_id: String,
        status: String,
        message: Option<String>,
    },

    #[error("status check failed: {0}")]
    StatusCheck(BackendError),

    #[error("flow abandoned")]
    Abandoned,
}

impl FlowError {
    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FlowError::InvalidCode(_) => ErrorCode::InvalidPaymentCode,
            FlowError::InsufficientBalance(_) => ErrorCode::InsufficientBalance,
            FlowError::AmountLocked => ErrorCode::AmountLocked,
            FlowError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            FlowError::QuoteUnavailable => ErrorCode::QuoteUnavailable,
            FlowError::InProgress => ErrorCode::SubmissionInProgress,
            FlowError::FlowFinished => ErrorCode::FlowFinished,
            FlowError::NoActiveIntent => ErrorCode::NoActiveIntent,
            FlowError::PinAttemptsExhausted { .. } => ErrorCode::PinAttemptsExhausted,
            FlowError::PinVerification { .. } => ErrorCode::PinVerificationError,
            FlowError::PinCancelled => ErrorCode::PinCancelled,
            FlowError::Submission(_) => ErrorCode::TransactionSubmissionFailed,
            FlowError::TransactionFailed { .. } => ErrorCode::TransactionFailed,
            FlowError::StatusCheck(_) => ErrorCode::StatusCheckFailed,
            FlowError::Abandoned => ErrorCode::FlowAbandoned,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            FlowError::InvalidCode(err) => err.user_message(),
            FlowError::InsufficientBalance(err) => format!(
                "Insufficient {} balance. Available: {}, Required: {}",
                err.asset,
                err.available.round_dp(2),
                err.required.round_dp(2)
            ),
            FlowError::AmountLocked => "The amount for this payment cannot be changed".to_string(),
            FlowError::InvalidAmount { .. } => "Please enter a valid amount".to_string(),
            FlowError::QuoteUnavailable => {
                "Conversion is currently unavailable for this asset".to_string()
            }
            FlowError::InProgress => "Your payment is already being processed".to_string(),
            FlowError::FlowFinished => "This payment has already finished".to_string(),
            FlowError::NoActiveIntent => "There is no payment to retry".to_string(),
            FlowError::PinAttemptsExhausted { .. } => {
                "Too many incorrect PIN attempts. Please try again later".to_string()
            }
            FlowError::PinVerification { .. } => {
                "We couldn't verify your PIN right now. Please try again later".to_string()
            }
            FlowError::PinCancelled => "Payment cancelled".to_string(),
            FlowError::Submission(err) => err.message.clone(),
            FlowError::TransactionFailed { message, .. } => message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| "The transaction failed. No funds were moved".to_string()),
            FlowError::StatusCheck(_) => {
                "We couldn't confirm your transaction. Please check your balance".to_string()
            }
            FlowError::Abandoned => "Payment cancelled".to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Submission(err) => err.retryable,
            FlowError::StatusCheck(err) => err.is_retryable(),
            FlowError::QuoteUnavailable | FlowError::InProgress => true,
            _ => false,
        }
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

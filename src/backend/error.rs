use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Backend rejected request: status={status}, message={}", .message.as_deref().unwrap_or("<none>"))]
    Rejected {
        status: u16,
        message: Option<String>,
        retryable: bool,
    },

    #[error("Invalid backend response: {message}")]
    InvalidResponse { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl BackendError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::NetworkError { .. } => true,
            BackendError::Timeout { .. } => true,
            BackendError::RateLimitError { .. } => true,
            BackendError::Rejected { retryable, .. } => *retryable,
            BackendError::InvalidResponse { .. } => false,
            BackendError::ConfigError { .. } => false,
        }
    }

    /// Message supplied by the backend itself, if any. Transport failures
    /// never carry one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            BackendError::Rejected { message, .. } => message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty()),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            BackendError::NetworkError { .. } | BackendError::Timeout { .. } => {
                "Service is temporarily unavailable. Please try again".to_string()
            }
            BackendError::RateLimitError {
                retry_after_seconds: Some(secs),
                ..
            } => format!("Too many requests. Please try again in {} seconds", secs),
            BackendError::RateLimitError { .. } => {
                "Too many requests. Please retry shortly".to_string()
            }
            BackendError::Rejected { .. } => self
                .backend_message()
                .map(str::to_string)
                .unwrap_or_else(|| "The request could not be completed".to_string()),
            BackendError::InvalidResponse { .. } | BackendError::ConfigError { .. } => {
                "Something went wrong. Please try again later".to_string()
            }
        }
    }
}

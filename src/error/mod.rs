//! Error types for qrlogin.

use thiserror::Error;

/// Primary error type for all login-session operations.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Invalid login parameters: {0}")]
    Param(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Provider rejected session: {0}")]
    ProviderRejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parameter,
    Network,
    Timeout,
    Rejected,
    Protocol,
    State,
    Configuration,
    Io,
}

impl LoginError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Param(_) => ErrorCategory::Parameter,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::ProviderRejected(_) => ErrorCategory::Rejected,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::UnknownSession(_) | Self::InvalidState(_) => ErrorCategory::State,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether the poll scheduler may retry the same session after this error.
    ///
    /// Only transport-level faults qualify; semantic outcomes reported by the
    /// provider are terminal for the session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout
        )
    }
}

impl From<reqwest::Error> for LoginError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(0)
        } else if error.is_decode() {
            Self::Protocol(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for LoginError {
    fn from(error: serde_json::Error) -> Self {
        Self::Protocol(error.to_string())
    }
}

impl From<toml::de::Error> for LoginError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LoginError>;

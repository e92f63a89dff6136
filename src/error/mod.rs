//! Error types for Lapse.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::auth::claims::DecodeError;
use crate::auth::error::AuthError;
use crate::poll::error::{FetchError, PollError};

/// Primary error type for all Lapse operations.
#[derive(Error, Debug)]
pub enum LapseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Status fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Poll error: {0}")]
    Poll(#[from] PollError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LapseError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Auth(err) => err.category(),
            Self::Fetch(_) => ErrorCategory::FetchFailed,
            Self::Poll(_) => ErrorCategory::InvalidState,
            Self::Io(_) => ErrorCategory::Io,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether this error is absorbed by the retry cadence of the subsystem
    /// that raised it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::NetworkUnavailable | ErrorCategory::FetchFailed
        )
    }

    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::CredentialRejected
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Decode => RecoverySuggestion::RefreshImmediately,
            ErrorCategory::NetworkUnavailable | ErrorCategory::FetchFailed => {
                RecoverySuggestion::RetryLater
            }
            ErrorCategory::CredentialRejected => RecoverySuggestion::SignInAgain,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LapseError>;

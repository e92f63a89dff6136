use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors raised while loading, refreshing or persisting a credential.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Network unavailable")]
    NetworkUnavailable,
    #[error("Credential rejected: {0}")]
    CredentialRejected(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Only a rejected credential ends the session; everything else is
    /// retried on the network cadence.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CredentialRejected(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialRejected(_) => ErrorCategory::CredentialRejected,
            Self::NotLoggedIn => ErrorCategory::InvalidState,
            Self::NetworkUnavailable | Self::Network(_) | Self::Timeout(_) => {
                ErrorCategory::NetworkUnavailable
            }
            Self::InvalidResponse(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(0)
        } else if error.is_connect() {
            Self::NetworkUnavailable
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

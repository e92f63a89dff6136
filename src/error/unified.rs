//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
///
/// The first four variants are the session taxonomy: decode failures mean
/// "refresh now", network-unavailable and fetch failures are absorbed and
/// retried, a rejected credential ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Decode,
    NetworkUnavailable,
    CredentialRejected,
    FetchFailed,
    Configuration,
    Io,
    Serialization,
    InvalidState,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// The access token cannot be read; renew it before using it.
    RefreshImmediately,
    /// Transient; the next scheduled attempt will retry.
    RetryLater,
    /// The session is over; prompt for re-authentication.
    SignInAgain,
    CheckConfiguration,
    ContactSupport,
}

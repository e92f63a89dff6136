use thiserror::Error;

/// A status fetch that did not produce a status. Never fatal to the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Status request failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Misuse of the poller API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("Resource {0} is already being watched")]
    AlreadyWatching(String),
    #[error("Watch on resource {0} is no longer active")]
    NotActive(String),
}

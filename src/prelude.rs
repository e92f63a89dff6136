//! Convenience re-exports for common use.

pub use crate::auth::{
    AlwaysReachable, AuthError, Credential, CredentialRefresher, CredentialStore, Reachability,
    RefreshOutcome, RefreshScheduler, RefreshState, Session, SessionStore, SignOutRequired,
};
pub use crate::client::SessionClient;
pub use crate::config::LapseConfig;
pub use crate::error::{LapseError, Result};
pub use crate::poll::{
    AppLifecycle, AppState, FetchError, LifecycleSource, PollError, PollSession,
    ReservationStatus, StatusFetcher, StatusPoller, StatusReport, StatusValue, WatchHandle,
};

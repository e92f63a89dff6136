//! Credential inspection, session state and proactive renewal.

pub mod backend;
pub mod claims;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod token;

pub use backend::{AlwaysReachable, CredentialRefresher, Reachability};
pub use claims::{DecodeError, DecodedClaims};
pub use error::AuthError;
pub use scheduler::{
    RefreshOutcome, RefreshScheduler, RefreshSettings, RefreshState, SignOutCallback,
    SignOutRequired,
};
pub use session::SessionStore;
pub use store::{CredentialStore, CredentialStoreConfig, FileCredentialStore, MemoryCredentialStore};
pub use token::{Credential, Session};
